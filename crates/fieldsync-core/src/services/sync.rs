//! Sync service wrapper used by the server.

use std::path::Path;
use std::time::Duration;

use uuid::Uuid;

use crate::db::{Database, EntityRepository, SqliteEntityRepository};
use crate::models::{ChangeRecord, EntityView, SyncConflict};
use crate::sync::{aggregate_pull, pull_livestock, BatchResult, ChangeApplier, CompositeSnapshot};
use crate::sync::{Scope, SyncContext};
use crate::Result;

/// Thread-safe entry point for pull, push and conflict audit operations.
#[derive(Clone)]
pub struct SyncService {
    db: Database,
    applier: ChangeApplier,
}

impl SyncService {
    pub fn new(db: Database) -> Self {
        Self {
            applier: ChangeApplier::new(db.clone()),
            db,
        }
    }

    /// Open a service over a file database (or `:memory:`).
    pub fn open_path(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self> {
        Ok(Self::new(Database::open_with_busy_timeout(path, busy_timeout)?))
    }

    /// Open an in-memory service (primarily for tests).
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    pub const fn database(&self) -> &Database {
        &self.db
    }

    /// Composite snapshot of every log kind visible to `scope`.
    pub async fn pull(&self, scope: &Scope) -> CompositeSnapshot {
        aggregate_pull(&self.db, scope).await
    }

    /// Livestock belonging to the given farms.
    pub async fn pull_livestock(
        &self,
        farm_uuids: impl IntoIterator<Item = Uuid>,
    ) -> Result<Vec<EntityView>> {
        pull_livestock(&self.db, farm_uuids).await
    }

    /// Merge a batch of client changes.
    pub async fn push(&self, ctx: &SyncContext, changes: Vec<ChangeRecord>) -> BatchResult {
        self.applier.apply_batch(ctx, changes).await
    }

    /// Most recent stale-write conflicts, newest first.
    pub async fn list_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let conn = db.connect()?;
            SqliteEntityRepository::new(&conn).list_conflicts(limit)
        })
        .await?
    }
}
