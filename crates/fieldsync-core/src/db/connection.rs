//! Database connection management

use crate::error::Result;
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use super::migrations;

/// Default time a writer waits on a locked database before giving up
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the authoritative store.
///
/// Cheap to clone. Each unit of work (one fetch, one applied change) opens its
/// own short-lived connection through [`Database::connect`], so fetchers can
/// run in parallel on blocking workers.
#[derive(Clone)]
pub struct Database {
    inner: Arc<Inner>,
}

struct Inner {
    target: Target,
    busy_timeout: Duration,
    // Holds a named in-memory database open for as long as the handle lives.
    _keepalive: Option<Mutex<Connection>>,
}

enum Target {
    File(PathBuf),
    SharedMemory(String),
}

impl Database {
    /// Open a file database at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations automatically. `:memory:` opens a private in-memory store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_busy_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Open a file database with an explicit busy timeout
    pub fn open_with_busy_timeout(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self> {
        let path = path.as_ref();
        if path == Path::new(":memory:") {
            return Self::open_in_memory_with_busy_timeout(busy_timeout);
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let database = Self {
            inner: Arc::new(Inner {
                target: Target::File(path.to_path_buf()),
                busy_timeout,
                _keepalive: None,
            }),
        };
        let conn = database.connect()?;
        migrations::run(&conn)?;
        tracing::info!("Opened sync store at {}", path.display());
        Ok(database)
    }

    /// Open an in-memory database (useful for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::open_in_memory_with_busy_timeout(DEFAULT_BUSY_TIMEOUT)
    }

    fn open_in_memory_with_busy_timeout(busy_timeout: Duration) -> Result<Self> {
        let uri = format!(
            "file:fieldsync-{}?mode=memory&cache=shared",
            Uuid::now_v7().simple()
        );
        let keepalive = Connection::open_with_flags(&uri, OpenFlags::default())?;
        keepalive.busy_timeout(busy_timeout)?;
        migrations::run(&keepalive)?;

        Ok(Self {
            inner: Arc::new(Inner {
                target: Target::SharedMemory(uri),
                busy_timeout,
                _keepalive: Some(Mutex::new(keepalive)),
            }),
        })
    }

    /// Open a new connection to the store
    pub fn connect(&self) -> Result<Connection> {
        let conn = match &self.inner.target {
            Target::File(path) => Connection::open(path)?,
            Target::SharedMemory(uri) => Connection::open_with_flags(uri, OpenFlags::default())?,
        };
        self.configure(&conn)?;
        Ok(conn)
    }

    /// Whether this handle points at an in-memory store
    pub fn is_in_memory(&self) -> bool {
        matches!(self.inner.target, Target::SharedMemory(_))
    }

    fn configure(&self, conn: &Connection) -> Result<()> {
        conn.busy_timeout(self.inner.busy_timeout)?;
        if matches!(self.inner.target, Target::File(_)) {
            // WAL lets fetchers read while a push commits
            conn.execute_batch("PRAGMA journal_mode = WAL;").ok();
            conn.execute_batch("PRAGMA synchronous = NORMAL;").ok();
        }
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(())
    }
}
