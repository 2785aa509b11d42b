//! Client UUID to server identity resolution

use uuid::Uuid;

use crate::db::EntityRepository;
use crate::error::Result;
use crate::models::{EntityKind, SyncEntity};

/// Whether an incoming change targets a record the server already holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    New,
    Existing {
        server_id: i64,
        current: Box<SyncEntity>,
    },
}

impl Identity {
    /// Look a record up by its client UUID. Tombstones count as existing.
    pub fn resolve(repo: &impl EntityRepository, kind: EntityKind, uuid: &Uuid) -> Result<Self> {
        Ok(match repo.find_by_uuid(kind, uuid)? {
            Some(current) => Self::Existing {
                server_id: current.server_id,
                current: Box::new(current),
            },
            None => Self::New,
        })
    }

    pub fn current(&self) -> Option<&SyncEntity> {
        match self {
            Self::New => None,
            Self::Existing { current, .. } => Some(current),
        }
    }

    pub const fn server_id(&self) -> Option<i64> {
        match self {
            Self::New => None,
            Self::Existing { server_id, .. } => Some(*server_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, SqliteEntityRepository};
    use chrono::Utc;
    use serde_json::Map;

    #[test]
    fn unknown_uuid_is_new() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connect().unwrap();
        let repo = SqliteEntityRepository::new(&conn);

        let identity = Identity::resolve(&repo, EntityKind::Feeding, &Uuid::now_v7()).unwrap();
        assert_eq!(identity, Identity::New);
        assert_eq!(identity.server_id(), None);
    }

    #[test]
    fn tombstoned_record_still_resolves() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connect().unwrap();
        let repo = SqliteEntityRepository::new(&conn);
        let now = Utc::now();

        let stored = repo
            .insert(SyncEntity {
                server_id: 0,
                kind: EntityKind::Livestock,
                uuid: Uuid::now_v7(),
                farm_uuid: Uuid::now_v7(),
                livestock_uuid: None,
                to_farm_uuid: None,
                payload: Map::new(),
                created_at: now,
                updated_at: now,
                is_deleted: true,
                created_by: None,
                updated_by: None,
            })
            .unwrap();

        let identity = Identity::resolve(&repo, EntityKind::Livestock, &stored.uuid).unwrap();
        assert_eq!(identity.server_id(), Some(stored.server_id));
        assert!(identity.current().is_some_and(|current| current.is_deleted));
    }

    #[test]
    fn lookup_is_per_kind() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connect().unwrap();
        let repo = SqliteEntityRepository::new(&conn);
        let now = Utc::now();

        let stored = repo
            .insert(SyncEntity {
                server_id: 0,
                kind: EntityKind::Livestock,
                uuid: Uuid::now_v7(),
                farm_uuid: Uuid::now_v7(),
                livestock_uuid: None,
                to_farm_uuid: None,
                payload: Map::new(),
                created_at: now,
                updated_at: now,
                is_deleted: false,
                created_by: None,
                updated_by: None,
            })
            .unwrap();

        let identity = Identity::resolve(&repo, EntityKind::Milking, &stored.uuid).unwrap();
        assert_eq!(identity, Identity::New);
    }
}
