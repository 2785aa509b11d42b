//! Generic scoped fetcher, driven by an entity descriptor

use crate::db::EntityRepository;
use crate::error::Result;
use crate::models::{EntityDescriptor, EntityKind, EntityView, SyncEntity};

use super::Scope;

/// Reads one entity kind's slice of server state for a scope
#[derive(Debug, Clone, Copy)]
pub struct EntityFetcher {
    descriptor: &'static EntityDescriptor,
}

impl EntityFetcher {
    pub const fn for_kind(kind: EntityKind) -> Self {
        Self {
            descriptor: kind.descriptor(),
        }
    }

    /// Fetch the live records visible to `scope`, newest-created first.
    ///
    /// Returns an empty list without touching storage when the scope lacks
    /// an identifier set the predicate needs.
    pub fn fetch(&self, repo: &impl EntityRepository, scope: &Scope) -> Result<Vec<EntityView>> {
        if !scope.admits_any(self.descriptor.predicate) {
            return Ok(Vec::new());
        }

        let rows = repo.list_scoped(self.descriptor.kind, scope)?;
        tracing::debug!("Fetched {} {} rows", rows.len(), self.descriptor.key);
        Ok(rows.iter().map(SyncEntity::project).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, SqliteEntityRepository};
    use chrono::{DateTime, Utc};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Map, Value};
    use uuid::Uuid;

    fn at(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw).unwrap().with_timezone(&Utc)
    }

    fn seed(
        repo: &SqliteEntityRepository<'_>,
        kind: EntityKind,
        farm: Uuid,
        animal: Option<Uuid>,
        to_farm: Option<Uuid>,
        created: &str,
    ) -> SyncEntity {
        repo.insert(SyncEntity {
            server_id: 0,
            kind,
            uuid: Uuid::now_v7(),
            farm_uuid: farm,
            livestock_uuid: animal,
            to_farm_uuid: to_farm,
            payload: Map::new(),
            created_at: at(created),
            updated_at: at(created),
            is_deleted: false,
            created_by: Some("internal-actor".into()),
            updated_by: None,
        })
        .unwrap()
    }

    #[test]
    fn empty_scope_returns_nothing() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connect().unwrap();
        let repo = SqliteEntityRepository::new(&conn);
        seed(&repo, EntityKind::Livestock, Uuid::now_v7(), None, None, "2024-01-01T00:00:00Z");

        for kind in EntityKind::ALL {
            let rows = EntityFetcher::for_kind(kind)
                .fetch(&repo, &Scope::default())
                .unwrap();
            assert!(rows.is_empty(), "{kind} leaked rows");
        }
    }

    #[test]
    fn transfer_is_visible_to_destination_farm_without_livestock() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connect().unwrap();
        let repo = SqliteEntityRepository::new(&conn);
        let source = Uuid::now_v7();
        let destination = Uuid::now_v7();

        let transfer = seed(
            &repo,
            EntityKind::Transfer,
            source,
            Some(Uuid::now_v7()),
            Some(destination),
            "2024-05-01T00:00:00Z",
        );

        let fetcher = EntityFetcher::for_kind(EntityKind::Transfer);
        let from_destination = fetcher.fetch(&repo, &Scope::farms([destination])).unwrap();
        assert_eq!(from_destination.len(), 1);
        assert_eq!(from_destination[0].uuid(), Some(transfer.uuid));

        let from_source = fetcher.fetch(&repo, &Scope::farms([source])).unwrap();
        assert_eq!(from_source.len(), 1);

        let elsewhere = fetcher
            .fetch(&repo, &Scope::farms([Uuid::now_v7()]))
            .unwrap();
        assert!(elsewhere.is_empty());
    }

    #[test]
    fn projection_hides_bookkeeping_and_nulls_missing_fields() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connect().unwrap();
        let repo = SqliteEntityRepository::new(&conn);
        let farm = Uuid::now_v7();
        let animal = Uuid::now_v7();
        seed(&repo, EntityKind::Milking, farm, Some(animal), None, "2024-01-01T00:00:00Z");

        let rows = EntityFetcher::for_kind(EntityKind::Milking)
            .fetch(&repo, &Scope::resolve([farm], [animal]))
            .unwrap();
        let view = rows[0].clone().into_inner();

        assert_eq!(view.get("amount"), Some(&Value::Null));
        assert_eq!(view.get("livestockUuid"), Some(&json!(animal.to_string())));
        assert_eq!(view.get("createdAt"), Some(&json!("2024-01-01T00:00:00Z")));
        assert!(!view.contains_key("createdBy"));
        assert!(!view.contains_key("serverId"));
        assert!(!view.contains_key("isDeleted"));
    }

    #[test]
    fn results_are_newest_first() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connect().unwrap();
        let repo = SqliteEntityRepository::new(&conn);
        let farm = Uuid::now_v7();

        let old = seed(&repo, EntityKind::Livestock, farm, None, None, "2023-01-01T00:00:00Z");
        let new = seed(&repo, EntityKind::Livestock, farm, None, None, "2024-01-01T00:00:00Z");

        let rows = EntityFetcher::for_kind(EntityKind::Livestock)
            .fetch(&repo, &Scope::farms([farm]))
            .unwrap();
        let uuids: Vec<_> = rows.iter().filter_map(EntityView::uuid).collect();
        assert_eq!(uuids, vec![new.uuid, old.uuid]);
    }
}
