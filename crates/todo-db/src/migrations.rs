use rusqlite::Connection;
use tracing::info;

use crate::error::DbError;

pub const SCHEMA_VERSION: i64 = 1;

pub fn run(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version > SCHEMA_VERSION {
        return Err(DbError::Migration(format!(
            "database schema v{version} is newer than supported v{SCHEMA_VERSION}"
        )));
    }

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            BEGIN;

            CREATE TABLE users (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                username        TEXT NOT NULL UNIQUE,
                password_hash   BLOB NOT NULL,
                salt            BLOB NOT NULL,
                first_name      TEXT,
                last_name       TEXT,
                created_at      TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE sessions (
                id          TEXT PRIMARY KEY,
                user_id     INTEGER NOT NULL
                            REFERENCES users(id) ON DELETE CASCADE ON UPDATE CASCADE,
                expires_at  INTEGER NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_sessions_expiry ON sessions(expires_at);
            CREATE INDEX idx_sessions_user ON sessions(user_id);

            CREATE TABLE lists (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                name        TEXT NOT NULL,
                owner_id    INTEGER REFERENCES users(id) ON DELETE SET NULL ON UPDATE CASCADE,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE permissions (
                user_id     INTEGER REFERENCES users(id) ON DELETE CASCADE ON UPDATE CASCADE,
                list_id     INTEGER NOT NULL
                            REFERENCES lists(id) ON DELETE CASCADE ON UPDATE CASCADE,
                role        TEXT NOT NULL CHECK (role IN ('read', 'write', 'owner')),
                UNIQUE (user_id, list_id)
            );

            -- UNIQUE(user_id, list_id) treats NULLs as distinct
            CREATE UNIQUE INDEX idx_permissions_anonymous
                ON permissions(list_id) WHERE user_id IS NULL;
            CREATE INDEX idx_permissions_list ON permissions(list_id);

            CREATE TABLE items (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                list_id     INTEGER NOT NULL
                            REFERENCES lists(id) ON DELETE CASCADE ON UPDATE CASCADE,
                name        TEXT NOT NULL,
                description TEXT,
                state       TEXT NOT NULL DEFAULT 'in-progress'
                            CHECK (state IN ('in-progress', 'complete', 'canceled')),
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_items_list ON items(list_id);

            INSERT INTO schema_version (version) VALUES (1);

            COMMIT;
            ",
        )?;
    }

    Ok(())
}
