//! fieldsync-core - Core library for fieldsync
//!
//! This crate contains the record models, the `SQLite` storage layer, and the
//! offline-first sync engine (scoped pulls, last-writer-wins pushes) used by
//! the fieldsync server.

pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod sync;

pub use error::{Error, Result};
pub use models::{ChangeOutcome, ChangeRecord, EntityKind, EntityView, SyncEntity};
pub use services::SyncService;
pub use sync::{BatchResult, CompositeSnapshot, Scope, SyncContext};
