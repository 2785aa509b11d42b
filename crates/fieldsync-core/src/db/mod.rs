//! Database layer for fieldsync

mod connection;
mod migrations;
mod repository;

pub use connection::{Database, DEFAULT_BUSY_TIMEOUT};
pub use repository::{EntityRepository, SqliteEntityRepository};
