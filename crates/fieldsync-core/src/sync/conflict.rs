//! Last-writer-wins decision for one incoming change

use crate::models::{ChangeRecord, Operation, RejectReason, SyncEntity};

/// What to do with an incoming change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Overwrite the stored record
    Apply,
    /// Persist as a brand new record
    ApplyAsNew,
    Reject(RejectReason),
}

/// Decide how `incoming` merges with the stored `current` version.
///
/// Timestamps are compared at millisecond precision, the resolution they are
/// stored at. Equal timestamps keep the committed version, which makes
/// retries of an already applied change a no-op.
pub fn decide(incoming: &ChangeRecord, current: Option<&SyncEntity>) -> Decision {
    let Some(current) = current else {
        return match incoming.operation {
            Operation::Create => Decision::ApplyAsNew,
            Operation::Update | Operation::Delete if incoming.is_reconstructable() => {
                Decision::ApplyAsNew
            }
            Operation::Update | Operation::Delete => {
                Decision::Reject(RejectReason::NotFoundForMutation)
            }
        };
    };

    if incoming.client_timestamp.timestamp_millis() > current.updated_at.timestamp_millis() {
        Decision::Apply
    } else {
        Decision::Reject(RejectReason::Stale)
    }
}
