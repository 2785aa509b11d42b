//! Push-side change records and per-record outcomes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::entity::{EntityKind, Ownership};

/// Mutation kind carried by a [`ChangeRecord`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

/// One client-side mutation submitted in a push batch.
///
/// `uuid` is the idempotency key: retries of the same logical change reuse it.
/// When `payload` is omitted, the record's remaining top-level fields are
/// treated as the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    pub entity_type: EntityKind,
    pub uuid: Uuid,
    #[serde(alias = "op")]
    pub operation: Operation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Map<String, Value>>,
    #[serde(alias = "updatedAt")]
    pub client_timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub inline: Map<String, Value>,
}

impl ChangeRecord {
    pub fn new(
        entity_type: EntityKind,
        uuid: Uuid,
        operation: Operation,
        client_timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            entity_type,
            uuid,
            operation,
            payload: None,
            client_timestamp,
            inline: Map::new(),
        }
    }

    /// Attach a payload object; non-object values clear it
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = match payload {
            Value::Object(fields) => Some(fields),
            _ => None,
        };
        self
    }

    /// The effective payload: explicit `payload`, else inline fields
    pub fn payload(&self) -> Option<&Map<String, Value>> {
        self.payload
            .as_ref()
            .or_else(|| (!self.inline.is_empty()).then_some(&self.inline))
    }

    /// Ownership columns, when the payload carries all of them
    pub fn ownership(&self) -> Option<Ownership> {
        self.payload()
            .and_then(|payload| self.entity_type.descriptor().ownership(payload))
    }

    /// Whether this change alone is enough to build the record from nothing
    pub fn is_reconstructable(&self) -> bool {
        self.ownership().is_some()
    }
}

/// Per-record result class reported back to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Applied,
    Rejected,
    Failed,
}

/// Why a change was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// The stored version is as new or newer
    Stale,
    /// Update/delete for an unknown UUID without a reconstructable payload
    NotFoundForMutation,
    /// A new record's payload lacks usable ownership fields
    InvalidPayload,
}

impl RejectReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stale => "stale",
            Self::NotFoundForMutation => "not_found_for_mutation",
            Self::InvalidPayload => "invalid_payload",
        }
    }
}

/// Result of applying one [`ChangeRecord`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeOutcome {
    pub uuid: Uuid,
    pub entity_type: EntityKind,
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ChangeOutcome {
    pub fn applied(change: &ChangeRecord, server_id: i64) -> Self {
        Self {
            uuid: change.uuid,
            entity_type: change.entity_type,
            outcome: Outcome::Applied,
            server_id: Some(server_id),
            reason: None,
        }
    }

    pub fn rejected(change: &ChangeRecord, reason: RejectReason, server_id: Option<i64>) -> Self {
        Self {
            uuid: change.uuid,
            entity_type: change.entity_type,
            outcome: Outcome::Rejected,
            server_id,
            reason: Some(reason.as_str().to_string()),
        }
    }

    pub fn failed(change: &ChangeRecord, error: &crate::Error) -> Self {
        Self {
            uuid: change.uuid,
            entity_type: change.entity_type,
            outcome: Outcome::Failed,
            server_id: None,
            reason: Some(error.client_message()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_explicit_payload() {
        let uuid = Uuid::now_v7();
        let farm = Uuid::now_v7();
        let raw = json!({
            "entityType": "livestock",
            "uuid": uuid,
            "operation": "create",
            "clientTimestamp": "2024-01-01T00:00:00Z",
            "payload": { "farmUuid": farm, "name": "Bella" },
        });

        let change: ChangeRecord = serde_json::from_value(raw).unwrap();
        assert_eq!(change.uuid, uuid);
        assert_eq!(change.operation, Operation::Create);
        assert!(change.inline.is_empty());
        assert_eq!(change.ownership().unwrap().farm_uuid, farm);
    }

    #[test]
    fn deserializes_inline_fields_with_aliases() {
        let farm = Uuid::now_v7();
        let raw = json!({
            "entityType": "livestock",
            "uuid": Uuid::now_v7(),
            "op": "update",
            "updatedAt": "2024-02-01T00:00:00Z",
            "farmUuid": farm,
            "motherUuid": Uuid::now_v7(),
        });

        let change: ChangeRecord = serde_json::from_value(raw).unwrap();
        assert_eq!(change.operation, Operation::Update);
        assert_eq!(change.client_timestamp.to_rfc3339(), "2024-02-01T00:00:00+00:00");
        let payload = change.payload().unwrap();
        assert!(payload.contains_key("motherUuid"));
        assert!(change.is_reconstructable());
    }

    #[test]
    fn missing_payload_is_not_reconstructable() {
        let change = ChangeRecord::new(
            EntityKind::Milking,
            Uuid::now_v7(),
            Operation::Delete,
            Utc::now(),
        );
        assert!(change.payload().is_none());
        assert!(!change.is_reconstructable());
    }

    #[test]
    fn outcome_serializes_without_empty_fields() {
        let change = ChangeRecord::new(
            EntityKind::Feeding,
            Uuid::now_v7(),
            Operation::Update,
            Utc::now(),
        );
        let encoded =
            serde_json::to_value(ChangeOutcome::rejected(&change, RejectReason::Stale, None))
                .unwrap();
        assert_eq!(encoded["outcome"], json!("rejected"));
        assert_eq!(encoded["reason"], json!("stale"));
        assert_eq!(encoded["entityType"], json!("feedings"));
        assert!(encoded.get("serverId").is_none());
    }
}
