//! Composite pull across every husbandry log kind

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::db::{Database, SqliteEntityRepository};
use crate::error::Result;
use crate::models::{EntityKind, EntityView};

use super::{EntityFetcher, Scope};

/// One kind's share of a composite pull
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PullSlice {
    Rows(Vec<EntityView>),
    /// The fetcher for this kind failed; other kinds are unaffected
    Failed { error: String },
}

impl PullSlice {
    pub fn rows(&self) -> Option<&[EntityView]> {
        match self {
            Self::Rows(rows) => Some(rows),
            Self::Failed { .. } => None,
        }
    }

    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Pull response keyed by wire key (`feedings`, `transfers`, ...)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompositeSnapshot(BTreeMap<EntityKind, PullSlice>);

impl CompositeSnapshot {
    pub fn get(&self, kind: EntityKind) -> Option<&PullSlice> {
        self.0.get(&kind)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Kinds whose fetcher failed
    pub fn failed_kinds(&self) -> Vec<EntityKind> {
        self.0
            .iter()
            .filter(|(_, slice)| slice.is_failed())
            .map(|(kind, _)| *kind)
            .collect()
    }

    /// Total number of rows across all populated slices
    pub fn row_count(&self) -> usize {
        self.0
            .values()
            .filter_map(PullSlice::rows)
            .map(<[EntityView]>::len)
            .sum()
    }
}

fn fetch_blocking(db: &Database, kind: EntityKind, scope: &Scope) -> Result<Vec<EntityView>> {
    let fetcher = EntityFetcher::for_kind(kind);
    if !scope.admits_any(kind.descriptor().predicate) {
        return Ok(Vec::new());
    }
    let conn = db.connect()?;
    fetcher.fetch(&SqliteEntityRepository::new(&conn), scope)
}

/// Fetch every log kind for `scope` concurrently.
///
/// Each fetcher runs on a blocking worker with its own connection. A failing
/// fetcher contributes an error marker under its key instead of failing the
/// whole pull.
pub async fn aggregate_pull(db: &Database, scope: &Scope) -> CompositeSnapshot {
    let mut tasks = JoinSet::new();
    for kind in EntityKind::LOGS {
        let db = db.clone();
        let scope = scope.clone();
        tasks.spawn_blocking(move || (kind, fetch_blocking(&db, kind, &scope)));
    }

    let mut slices = BTreeMap::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((kind, Ok(rows))) => {
                slices.insert(kind, PullSlice::Rows(rows));
            }
            Ok((kind, Err(e))) => {
                tracing::warn!("Fetching {kind} failed: {e}");
                slices.insert(
                    kind,
                    PullSlice::Failed {
                        error: e.client_message(),
                    },
                );
            }
            Err(e) => tracing::warn!("Fetch worker did not complete: {e}"),
        }
    }

    // A worker that panicked still gets its key
    for kind in EntityKind::LOGS {
        slices.entry(kind).or_insert_with(|| PullSlice::Failed {
            error: "fetch worker did not complete".to_string(),
        });
    }

    CompositeSnapshot(slices)
}

/// Livestock visible to the given farms, newest-created first
pub async fn pull_livestock(
    db: &Database,
    farm_uuids: impl IntoIterator<Item = Uuid>,
) -> Result<Vec<EntityView>> {
    let db = db.clone();
    let scope = Scope::farms(farm_uuids);
    tokio::task::spawn_blocking(move || fetch_blocking(&db, EntityKind::Livestock, &scope)).await?
}
