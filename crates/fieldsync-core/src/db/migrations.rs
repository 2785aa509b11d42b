//! Database migrations

use crate::error::Result;
use crate::models::{EntityDescriptor, EntityKind};
use rusqlite::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    Ok(version)
}

/// Table and indexes for one syncable entity kind
fn entity_table_sql(descriptor: &EntityDescriptor) -> String {
    let table = descriptor.table;
    let mut sql = format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            server_id INTEGER PRIMARY KEY AUTOINCREMENT,
            uuid TEXT NOT NULL UNIQUE,
            farm_uuid TEXT NOT NULL,
            livestock_uuid TEXT,
            to_farm_uuid TEXT,
            payload TEXT NOT NULL DEFAULT '{{}}',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            is_deleted INTEGER NOT NULL DEFAULT 0,
            created_by TEXT,
            updated_by TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_{table}_farm_created ON {table}(farm_uuid, created_at DESC);"
    );
    if descriptor.tracks_livestock() {
        sql.push_str(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_livestock ON {table}(livestock_uuid);"
        ));
    }
    if descriptor.tracks_destination() {
        sql.push_str(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_to_farm ON {table}(to_farm_uuid, created_at DESC);"
        ));
    }
    sql
}

/// Migration to version 1: one table per syncable entity kind
fn migrate_v1(conn: &Connection) -> Result<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )?;
    for kind in EntityKind::ALL {
        tx.execute_batch(&entity_table_sql(kind.descriptor()))?;
    }
    tx.execute("INSERT INTO schema_version (version) VALUES (1)", [])?;

    tx.commit()?;
    tracing::info!("Migrated database to version 1");
    Ok(())
}

/// Migration to version 2: LWW conflict logging support
fn migrate_v2(conn: &Connection) -> Result<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS sync_conflicts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            entity_type TEXT NOT NULL,
            entity_uuid TEXT NOT NULL,
            stored_updated_at INTEGER NOT NULL,
            incoming_updated_at INTEGER NOT NULL,
            resolved_at INTEGER NOT NULL,
            strategy TEXT NOT NULL,
            actor TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_sync_conflicts_entity_uuid ON sync_conflicts(entity_uuid);
        CREATE INDEX IF NOT EXISTS idx_sync_conflicts_resolved_at ON sync_conflicts(resolved_at DESC);
        INSERT INTO schema_version (version) VALUES (2);",
    )?;

    tx.commit()?;
    tracing::info!("Migrated database to version {CURRENT_VERSION}");
    Ok(())
}
