//! Sync entity repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, Row};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{ChangeRecord, EntityKind, ScopePredicate, SyncConflict, SyncEntity};
use crate::sync::Scope;

const ENTITY_COLUMNS: &str = "server_id, uuid, farm_uuid, livestock_uuid, to_farm_uuid, payload, \
     created_at, updated_at, is_deleted, created_by, updated_by";

/// Trait for sync entity storage operations
pub trait EntityRepository {
    /// Look up a record by client UUID, tombstones included
    fn find_by_uuid(&self, kind: EntityKind, uuid: &Uuid) -> Result<Option<SyncEntity>>;

    /// Insert a new record, returning it with its minted server id
    fn insert(&self, entity: SyncEntity) -> Result<SyncEntity>;

    /// Overwrite the mutable columns of an existing record
    fn update(&self, entity: &SyncEntity) -> Result<()>;

    /// List live records visible to a scope, newest-created first
    fn list_scoped(&self, kind: EntityKind, scope: &Scope) -> Result<Vec<SyncEntity>>;

    /// Log a stale write that lost to the stored version
    fn record_conflict(
        &self,
        current: &SyncEntity,
        incoming: &ChangeRecord,
        actor: Option<&str>,
    ) -> Result<SyncConflict>;

    /// Recently resolved conflicts, newest first
    fn list_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>>;
}

/// `SQLite` implementation of `EntityRepository`
pub struct SqliteEntityRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteEntityRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse an entity from a database row
    fn parse_entity(kind: EntityKind, row: &Row<'_>) -> rusqlite::Result<SyncEntity> {
        let payload: String = row.get(5)?;
        let payload: Map<String, Value> = serde_json::from_str(&payload)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;

        Ok(SyncEntity {
            server_id: row.get(0)?,
            kind,
            uuid: uuid_column(row, 1)?,
            farm_uuid: uuid_column(row, 2)?,
            livestock_uuid: optional_uuid_column(row, 3)?,
            to_farm_uuid: optional_uuid_column(row, 4)?,
            payload,
            created_at: millis_column(row, 6)?,
            updated_at: millis_column(row, 7)?,
            is_deleted: row.get::<_, i32>(8)? != 0,
            created_by: row.get(9)?,
            updated_by: row.get(10)?,
        })
    }

    fn parse_conflict(row: &Row<'_>) -> rusqlite::Result<SyncConflict> {
        let entity_type: String = row.get(1)?;
        let entity_type = entity_type.parse().map_err(|e: String| {
            rusqlite::Error::FromSqlConversionFailure(1, Type::Text, e.into())
        })?;

        Ok(SyncConflict {
            id: row.get(0)?,
            entity_type,
            entity_uuid: uuid_column(row, 2)?,
            stored_updated_at: millis_column(row, 3)?,
            incoming_updated_at: millis_column(row, 4)?,
            resolved_at: millis_column(row, 5)?,
            strategy: row.get(6)?,
            actor: row.get(7)?,
        })
    }
}

impl EntityRepository for SqliteEntityRepository<'_> {
    fn find_by_uuid(&self, kind: EntityKind, uuid: &Uuid) -> Result<Option<SyncEntity>> {
        let sql = format!(
            "SELECT {ENTITY_COLUMNS} FROM {} WHERE uuid = ?",
            kind.table()
        );
        let result = self.conn.query_row(&sql, params![uuid.to_string()], |row| {
            Self::parse_entity(kind, row)
        });

        match result {
            Ok(entity) => Ok(Some(entity)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn insert(&self, mut entity: SyncEntity) -> Result<SyncEntity> {
        let sql = format!(
            "INSERT INTO {} (uuid, farm_uuid, livestock_uuid, to_farm_uuid, payload, created_at, \
             updated_at, is_deleted, created_by, updated_by)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            entity.kind.table()
        );
        self.conn.execute(
            &sql,
            params![
                entity.uuid.to_string(),
                entity.farm_uuid.to_string(),
                entity.livestock_uuid.map(|uuid| uuid.to_string()),
                entity.to_farm_uuid.map(|uuid| uuid.to_string()),
                serde_json::to_string(&entity.payload)?,
                entity.created_at.timestamp_millis(),
                entity.updated_at.timestamp_millis(),
                i32::from(entity.is_deleted),
                entity.created_by,
                entity.updated_by,
            ],
        )?;

        entity.server_id = self.conn.last_insert_rowid();
        Ok(entity)
    }

    fn update(&self, entity: &SyncEntity) -> Result<()> {
        let sql = format!(
            "UPDATE {} SET farm_uuid = ?, livestock_uuid = ?, to_farm_uuid = ?, payload = ?, \
             updated_at = ?, is_deleted = ?, updated_by = ?
             WHERE server_id = ?",
            entity.kind.table()
        );
        let rows = self.conn.execute(
            &sql,
            params![
                entity.farm_uuid.to_string(),
                entity.livestock_uuid.map(|uuid| uuid.to_string()),
                entity.to_farm_uuid.map(|uuid| uuid.to_string()),
                serde_json::to_string(&entity.payload)?,
                entity.updated_at.timestamp_millis(),
                i32::from(entity.is_deleted),
                entity.updated_by,
                entity.server_id,
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound(format!("{} {}", entity.kind, entity.uuid)));
        }

        Ok(())
    }

    fn list_scoped(&self, kind: EntityKind, scope: &Scope) -> Result<Vec<SyncEntity>> {
        let farms: Vec<String> = scope.farm_uuids().iter().map(Uuid::to_string).collect();
        let livestock: Vec<String> = scope
            .livestock_uuids()
            .iter()
            .map(Uuid::to_string)
            .collect();

        // Numbered parameters let the transfer predicate reuse the farm list
        let farm_params = numbered_placeholders(1, farms.len());
        let (predicate, values): (String, Vec<&String>) = match kind.descriptor().predicate {
            ScopePredicate::FarmAndLivestock => (
                format!(
                    "farm_uuid IN ({farm_params}) AND livestock_uuid IN ({})",
                    numbered_placeholders(farms.len() + 1, livestock.len())
                ),
                farms.iter().chain(&livestock).collect(),
            ),
            ScopePredicate::FarmOnly => (
                format!("farm_uuid IN ({farm_params})"),
                farms.iter().collect(),
            ),
            ScopePredicate::SourceOrDestinationFarm => (
                format!("(farm_uuid IN ({farm_params}) OR to_farm_uuid IN ({farm_params}))"),
                farms.iter().collect(),
            ),
        };

        let sql = format!(
            "SELECT {ENTITY_COLUMNS}
             FROM {}
             WHERE {predicate} AND is_deleted = 0
             ORDER BY created_at DESC, server_id DESC",
            kind.table()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let entities = stmt
            .query_map(params_from_iter(values), |row| Self::parse_entity(kind, row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(entities)
    }

    fn record_conflict(
        &self,
        current: &SyncEntity,
        incoming: &ChangeRecord,
        actor: Option<&str>,
    ) -> Result<SyncConflict> {
        let resolved_at = Utc::now();
        self.conn.execute(
            "INSERT INTO sync_conflicts (
                entity_type,
                entity_uuid,
                stored_updated_at,
                incoming_updated_at,
                resolved_at,
                strategy,
                actor
            ) VALUES (?, ?, ?, ?, ?, 'lww', ?)",
            params![
                current.kind.key(),
                current.uuid.to_string(),
                current.updated_at.timestamp_millis(),
                incoming.client_timestamp.timestamp_millis(),
                resolved_at.timestamp_millis(),
                actor,
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        self.conn
            .query_row(
                "SELECT id, entity_type, entity_uuid, stored_updated_at, incoming_updated_at,
                        resolved_at, strategy, actor
                 FROM sync_conflicts WHERE id = ?",
                params![id],
                Self::parse_conflict,
            )
            .map_err(Into::into)
    }

    fn list_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, entity_type, entity_uuid, stored_updated_at, incoming_updated_at,
                    resolved_at, strategy, actor
             FROM sync_conflicts
             ORDER BY resolved_at DESC, id DESC
             LIMIT ?",
        )?;

        let conflicts = stmt
            .query_map(params![limit as i64], Self::parse_conflict)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(conflicts)
    }
}

fn numbered_placeholders(first: usize, count: usize) -> String {
    (first..first + count)
        .map(|index| format!("?{index}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn uuid_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn optional_uuid_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|raw| {
        raw.parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn millis_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let millis: i64 = row.get(idx)?;
    DateTime::from_timestamp_millis(millis)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, millis))
}
