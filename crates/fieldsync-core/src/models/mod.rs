//! Data models for fieldsync

mod change;
mod entity;
mod sync_conflict;
mod sync_entity;

pub use change::{ChangeOutcome, ChangeRecord, Operation, Outcome, RejectReason};
pub use entity::{
    uuid_field, EntityDescriptor, EntityKind, Ownership, ScopePredicate, CREATED_AT, FARM_UUID,
    LIVESTOCK_UUID, TO_FARM_UUID,
};
pub use sync_conflict::SyncConflict;
pub use sync_entity::{format_timestamp, EntityView, SyncEntity};
