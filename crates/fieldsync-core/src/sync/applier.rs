//! Push path: merge client change batches into server state

use chrono::{DateTime, Utc};
use rusqlite::TransactionBehavior;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::{Database, EntityRepository, SqliteEntityRepository};
use crate::error::{Error, Result};
use crate::models::{
    uuid_field, ChangeOutcome, ChangeRecord, Operation, Outcome, RejectReason, SyncEntity,
    CREATED_AT, FARM_UUID, LIVESTOCK_UUID, TO_FARM_UUID,
};

use super::conflict::{decide, Decision};
use super::identity::Identity;
use super::locks::RecordLocks;
use super::SyncContext;

/// Per-change outcomes of one push, in request order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchResult(Vec<ChangeOutcome>);

impl BatchResult {
    pub fn outcomes(&self) -> &[ChangeOutcome] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<ChangeOutcome> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn count(&self, outcome: Outcome) -> usize {
        self.0.iter().filter(|item| item.outcome == outcome).count()
    }
}

/// Applies change batches, one record at a time.
///
/// Every record is decided and written inside a per-record lock and its own
/// immediate transaction, so a rejection or failure never affects siblings.
#[derive(Clone)]
pub struct ChangeApplier {
    db: Database,
    locks: RecordLocks,
}

impl ChangeApplier {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            locks: RecordLocks::new(),
        }
    }

    /// Apply `changes` in order and report an outcome for each
    pub async fn apply_batch(&self, ctx: &SyncContext, changes: Vec<ChangeRecord>) -> BatchResult {
        let mut outcomes = Vec::with_capacity(changes.len());

        for change in changes {
            let (kind, uuid) = (change.entity_type, change.uuid);
            let _guard = self.locks.acquire(kind, uuid).await;

            let db = self.db.clone();
            let actor = ctx.actor.clone();
            let joined = tokio::task::spawn_blocking(move || {
                commit_change(&db, actor.as_deref(), &change).unwrap_or_else(|e| {
                    tracing::warn!("Failed to apply {} {}: {e}", change.entity_type, change.uuid);
                    ChangeOutcome::failed(&change, &e)
                })
            })
            .await;

            let outcome = joined.unwrap_or_else(|e| {
                let error = Error::from(e);
                tracing::warn!("Apply worker for {kind} {uuid} did not complete: {error}");
                ChangeOutcome {
                    uuid,
                    entity_type: kind,
                    outcome: Outcome::Failed,
                    server_id: None,
                    reason: Some(error.client_message()),
                }
            });
            outcomes.push(outcome);
        }

        let result = BatchResult(outcomes);
        tracing::info!(
            "Push from {}: {} applied, {} rejected, {} failed",
            ctx.actor.as_deref().unwrap_or("anonymous"),
            result.count(Outcome::Applied),
            result.count(Outcome::Rejected),
            result.count(Outcome::Failed)
        );
        result
    }
}

fn commit_change(db: &Database, actor: Option<&str>, change: &ChangeRecord) -> Result<ChangeOutcome> {
    let mut conn = db.connect()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let outcome = apply_change(&SqliteEntityRepository::new(&tx), actor, change)?;
    tx.commit()?;
    Ok(outcome)
}

/// Resolve, decide and write one change through `repo`.
///
/// The caller owns the transaction and the record lock.
pub fn apply_change(
    repo: &impl EntityRepository,
    actor: Option<&str>,
    change: &ChangeRecord,
) -> Result<ChangeOutcome> {
    let identity = Identity::resolve(repo, change.entity_type, &change.uuid)?;

    match decide(change, identity.current()) {
        Decision::ApplyAsNew => {
            let Some(entity) = build_new(change, actor) else {
                return Ok(ChangeOutcome::rejected(
                    change,
                    RejectReason::InvalidPayload,
                    None,
                ));
            };
            let stored = repo.insert(entity)?;
            Ok(ChangeOutcome::applied(change, stored.server_id))
        }
        Decision::Apply => match identity {
            Identity::Existing { server_id, current } => {
                repo.update(&merge(*current, change, actor))?;
                Ok(ChangeOutcome::applied(change, server_id))
            }
            Identity::New => Err(Error::NotFound(format!(
                "{} {}",
                change.entity_type, change.uuid
            ))),
        },
        Decision::Reject(reason) => {
            // Equal timestamps are replays of the committed write, not conflicts
            let stale = identity.current().filter(|current| {
                reason == RejectReason::Stale
                    && to_millis(change.client_timestamp) < current.updated_at
            });
            if let Some(current) = stale {
                repo.record_conflict(current, change, actor)?;
                tracing::warn!(
                    "Rejected stale {} {}: incoming {} is not after stored {}",
                    change.entity_type,
                    change.uuid,
                    change.client_timestamp,
                    current.updated_at
                );
            }
            Ok(ChangeOutcome::rejected(change, reason, identity.server_id()))
        }
    }
}

/// Build a record from a change that has no stored counterpart.
///
/// Returns `None` when the payload lacks usable ownership fields.
fn build_new(change: &ChangeRecord, actor: Option<&str>) -> Option<SyncEntity> {
    let descriptor = change.entity_type.descriptor();
    let payload = change.payload()?;
    let ownership = descriptor.ownership(payload)?;

    let updated_at = to_millis(change.client_timestamp);
    let created_at = payload
        .get(CREATED_AT)
        .and_then(Value::as_str)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|parsed| to_millis(parsed.with_timezone(&Utc)))
        .filter(|created| *created <= updated_at)
        .unwrap_or(updated_at);

    Some(SyncEntity {
        server_id: 0,
        kind: change.entity_type,
        uuid: change.uuid,
        farm_uuid: ownership.farm_uuid,
        livestock_uuid: ownership.livestock_uuid,
        to_farm_uuid: ownership.to_farm_uuid,
        payload: descriptor.sanitize(payload),
        created_at,
        updated_at,
        is_deleted: change.operation == Operation::Delete,
        created_by: actor.map(str::to_string),
        updated_by: actor.map(str::to_string),
    })
}

/// Fold a winning change into the stored record
fn merge(mut current: SyncEntity, change: &ChangeRecord, actor: Option<&str>) -> SyncEntity {
    let descriptor = change.entity_type.descriptor();

    match change.operation {
        Operation::Delete => current.is_deleted = true,
        Operation::Create | Operation::Update => {
            current.is_deleted = false;
            if let Some(payload) = change.payload() {
                current.payload = descriptor.sanitize(payload);
                if let Some(farm_uuid) = uuid_field(payload, FARM_UUID) {
                    current.farm_uuid = farm_uuid;
                }
                if descriptor.tracks_livestock() {
                    if let Some(livestock_uuid) = uuid_field(payload, LIVESTOCK_UUID) {
                        current.livestock_uuid = Some(livestock_uuid);
                    }
                }
                if descriptor.tracks_destination() {
                    if let Some(to_farm_uuid) = uuid_field(payload, TO_FARM_UUID) {
                        current.to_farm_uuid = Some(to_farm_uuid);
                    }
                }
            }
        }
    }

    current.updated_at = to_millis(change.client_timestamp);
    current.updated_by = actor.map(str::to_string);
    current
}

fn to_millis(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(timestamp.timestamp_millis()).unwrap_or(timestamp)
}
