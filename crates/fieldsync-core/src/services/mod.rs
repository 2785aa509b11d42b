//! Service layer shared by every fieldsync interface

mod sync;

pub use sync::SyncService;
