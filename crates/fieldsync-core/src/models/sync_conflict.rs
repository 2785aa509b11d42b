//! Sync conflict model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::entity::EntityKind;

/// Recorded sync conflict resolved by strategy (e.g., LWW)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConflict {
    /// Conflict row identifier
    pub id: i64,
    /// Entity type of the record involved
    pub entity_type: EntityKind,
    /// Record involved in the conflict
    pub entity_uuid: Uuid,
    /// Stored row's timestamp when conflict occurred
    pub stored_updated_at: DateTime<Utc>,
    /// Incoming change's timestamp that was rejected
    pub incoming_updated_at: DateTime<Utc>,
    /// Resolution timestamp
    pub resolved_at: DateTime<Utc>,
    /// Resolution strategy name
    pub strategy: String,
    /// Actor whose change lost, when known
    pub actor: Option<String>,
}
