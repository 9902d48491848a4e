pub mod error;
pub mod migrations;
pub mod models;
pub mod queries;

pub use error::DbError;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::models::PurgeReport;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Bounds on the shared connection pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Hard cap on concurrently checked-out connections.
    pub max_size: u32,
    /// How long a checkout waits for a free connection before giving up.
    pub connection_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 10,
            connection_timeout: Duration::from_secs(30),
        }
    }
}

pub struct Database {
    pool: Pool<SqliteConnectionManager>,
}

impl Database {
    pub fn open(path: &Path, config: &PoolConfig) -> Result<Self, DbError> {
        if config.max_size == 0 {
            return Err(DbError::PoolConfig("max_size must be at least 1".into()));
        }

        let manager = SqliteConnectionManager::file(path).with_init(init_connection);
        let pool = Pool::builder()
            .max_size(config.max_size)
            .connection_timeout(config.connection_timeout)
            .build(manager)?;
        let db = Self { pool };

        db.with_conn(|conn| {
            // WAL mode for concurrent readers; persistent in the database file
            let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
            migrations::run(conn)
        })?;

        info!(
            "Database opened at {} (pool of {})",
            path.display(),
            config.max_size
        );
        Ok(db)
    }

    /// Single-connection in-memory database. Every checkout sees the same data
    /// because the pool never retires its only connection.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let manager = SqliteConnectionManager::memory().with_init(init_connection);
        let pool = Pool::builder()
            .max_size(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .build(manager)?;
        let db = Self { pool };
        db.with_conn(migrations::run)?;
        Ok(db)
    }

    /// Check out one connection for the duration of `f`. The connection goes
    /// back to the pool when `f` returns, on success and on error alike.
    pub fn with_conn<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Connection) -> Result<T, E>,
        E: From<DbError>,
    {
        let conn = self.pool.get().map_err(DbError::from)?;
        f(&conn)
    }

    /// Delete expired sessions and lists nobody holds a permission on.
    pub fn purge(&self, now_ms: i64) -> Result<PurgeReport, DbError> {
        self.with_conn(|conn| {
            let sessions = queries::delete_expired_sessions(conn, now_ms)?;
            let lists = queries::delete_orphan_lists(conn)?;
            Ok(PurgeReport { sessions, lists })
        })
    }
}

fn init_connection(conn: &mut Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(BUSY_TIMEOUT)
}
