//! Offline-first synchronization: scoped pulls and last-writer-wins pushes

mod aggregator;
mod applier;
mod conflict;
mod fetcher;
mod identity;
mod locks;
mod scope;

pub use aggregator::{aggregate_pull, pull_livestock, CompositeSnapshot, PullSlice};
pub use applier::{apply_change, BatchResult, ChangeApplier};
pub use conflict::{decide, Decision};
pub use fetcher::EntityFetcher;
pub use identity::Identity;
pub use locks::{RecordGuard, RecordLocks};
pub use scope::Scope;

/// Who is performing a sync operation.
///
/// Passed explicitly to every push; stamped into `created_by`/`updated_by`
/// and the conflict log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncContext {
    pub actor: Option<String>,
}

impl SyncContext {
    pub const fn anonymous() -> Self {
        Self { actor: None }
    }

    pub fn for_actor(actor: impl Into<String>) -> Self {
        Self {
            actor: Some(actor.into()),
        }
    }
}
