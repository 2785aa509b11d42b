//! Stored sync entity and its wire projection

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::entity::{EntityKind, CREATED_AT, FARM_UUID, LIVESTOCK_UUID, TO_FARM_UUID};

/// A syncable record as held in server storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncEntity {
    /// Server-assigned sequential id
    pub server_id: i64,
    pub kind: EntityKind,
    /// Client-assigned identity, immutable
    pub uuid: Uuid,
    pub farm_uuid: Uuid,
    /// Animal the log refers to (log kinds only)
    pub livestock_uuid: Option<Uuid>,
    /// Destination farm (transfers only)
    pub to_farm_uuid: Option<Uuid>,
    /// Declared entity-specific fields
    pub payload: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Tombstone marker
    pub is_deleted: bool,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
}

/// Flat, wire-safe projection of a [`SyncEntity`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityView(Map<String, Value>);

impl SyncEntity {
    /// Project onto the wire shape.
    ///
    /// Every declared field is present (`null` when unset); bookkeeping
    /// columns are never included.
    pub fn project(&self) -> EntityView {
        let descriptor = self.kind.descriptor();
        let mut view = Map::new();
        view.insert("uuid".into(), Value::String(self.uuid.to_string()));
        view.insert(FARM_UUID.into(), Value::String(self.farm_uuid.to_string()));
        if descriptor.tracks_livestock() {
            view.insert(LIVESTOCK_UUID.into(), optional_uuid(self.livestock_uuid));
        }
        if descriptor.tracks_destination() {
            view.insert(TO_FARM_UUID.into(), optional_uuid(self.to_farm_uuid));
        }
        for field in descriptor.fields {
            let value = self.payload.get(*field).cloned().unwrap_or(Value::Null);
            view.insert((*field).to_string(), value);
        }
        view.insert(
            CREATED_AT.into(),
            Value::String(format_timestamp(self.created_at)),
        );
        view.insert(
            "updatedAt".into(),
            Value::String(format_timestamp(self.updated_at)),
        );
        EntityView(view)
    }
}

impl EntityView {
    /// Look up a projected field
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// The record's client UUID
    pub fn uuid(&self) -> Option<Uuid> {
        self.get("uuid")?.as_str()?.parse().ok()
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

/// ISO-8601 in UTC with a `Z` suffix and only as much fraction as needed
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn optional_uuid(value: Option<Uuid>) -> Value {
    value.map_or(Value::Null, |uuid| Value::String(uuid.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn livestock() -> SyncEntity {
        let at = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        SyncEntity {
            server_id: 7,
            kind: EntityKind::Livestock,
            uuid: Uuid::now_v7(),
            farm_uuid: Uuid::now_v7(),
            livestock_uuid: None,
            to_farm_uuid: None,
            payload: json!({ "name": "Bella", "gender": "female" })
                .as_object()
                .cloned()
                .unwrap(),
            created_at: at,
            updated_at: at,
            is_deleted: false,
            created_by: Some("officer-1".into()),
            updated_by: None,
        }
    }

    #[test]
    fn projection_contains_every_declared_field() {
        let entity = livestock();
        let view = entity.project();

        for field in EntityKind::Livestock.descriptor().fields {
            assert!(view.get(field).is_some(), "missing {field}");
        }
        assert_eq!(view.get("name"), Some(&json!("Bella")));
        assert_eq!(view.get("motherUuid"), Some(&Value::Null));
        assert_eq!(view.uuid(), Some(entity.uuid));
    }

    #[test]
    fn projection_hides_bookkeeping() {
        let view = livestock().project().into_inner();
        for hidden in ["serverId", "isDeleted", "createdBy", "updatedBy", "livestockUuid"] {
            assert!(!view.contains_key(hidden), "leaked {hidden}");
        }
    }

    #[test]
    fn timestamps_render_as_iso8601() {
        let view = livestock().project();
        assert_eq!(view.get("createdAt"), Some(&json!("2024-01-01T00:00:00Z")));
        assert_eq!(view.get("updatedAt"), Some(&json!("2024-01-01T00:00:00Z")));
    }

    #[test]
    fn transfer_projection_includes_both_farms() {
        let mut entity = livestock();
        entity.kind = EntityKind::Transfer;
        entity.livestock_uuid = Some(Uuid::now_v7());
        entity.to_farm_uuid = Some(Uuid::now_v7());

        let view = entity.project();
        assert_eq!(
            view.get("toFarmUuid"),
            Some(&json!(entity.to_farm_uuid.unwrap().to_string()))
        );
        assert!(view.get("livestockUuid").is_some());
    }
}
