use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row};
use todo_types::models::{ItemState, Role};

use crate::error::DbError;
use crate::models::{
    ItemChanges, ItemRow, ListRow, NewUser, PermissionRow, SessionRow, UserChanges, UserRow,
};

type Result<T> = std::result::Result<T, DbError>;

// -- Users --

pub fn insert_user(conn: &Connection, user: &NewUser<'_>) -> Result<i64> {
    conn.execute(
        "INSERT INTO users (username, password_hash, salt, first_name, last_name)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            user.username,
            user.password_hash,
            user.salt,
            user.first_name,
            user.last_name
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn find_user_by_username(conn: &Connection, username: &str) -> Result<Option<UserRow>> {
    let row = conn
        .query_row(
            "SELECT id, username, password_hash, salt, first_name, last_name, created_at
             FROM users WHERE username = ?1",
            [username],
            user_from_row,
        )
        .optional()?;
    Ok(row)
}

pub fn find_user_by_id(conn: &Connection, id: i64) -> Result<Option<UserRow>> {
    let row = conn
        .query_row(
            "SELECT id, username, password_hash, salt, first_name, last_name, created_at
             FROM users WHERE id = ?1",
            [id],
            user_from_row,
        )
        .optional()?;
    Ok(row)
}

/// Apply `changes` in one statement. Returns the number of rows touched.
pub fn update_user(conn: &Connection, id: i64, changes: &UserChanges) -> Result<usize> {
    let (password_hash, salt) = match &changes.credentials {
        Some((hash, salt)) => (Some(hash.as_slice()), Some(salt.as_slice())),
        None => (None, None),
    };

    let updated = conn.execute(
        "UPDATE users SET
             username      = COALESCE(?2, username),
             first_name    = COALESCE(?3, first_name),
             last_name     = COALESCE(?4, last_name),
             password_hash = COALESCE(?5, password_hash),
             salt          = COALESCE(?6, salt)
         WHERE id = ?1",
        rusqlite::params![
            id,
            changes.username,
            changes.first_name,
            changes.last_name,
            password_hash,
            salt
        ],
    )?;
    Ok(updated)
}

/// Sessions and permissions go with the user through cascades.
pub fn delete_user(conn: &Connection, id: i64) -> Result<usize> {
    Ok(conn.execute("DELETE FROM users WHERE id = ?1", [id])?)
}

// -- Sessions --

pub fn insert_session(conn: &Connection, id: &str, user_id: i64, expires_at: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO sessions (id, user_id, expires_at) VALUES (?1, ?2, ?3)",
        rusqlite::params![id, user_id, expires_at],
    )?;
    Ok(())
}

/// A session that exists and has not yet expired at `now`.
pub fn find_live_session(conn: &Connection, id: &str, now: i64) -> Result<Option<SessionRow>> {
    let row = conn
        .query_row(
            "SELECT id, user_id, expires_at FROM sessions WHERE id = ?1 AND expires_at > ?2",
            rusqlite::params![id, now],
            |row| {
                Ok(SessionRow {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    expires_at: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

pub fn delete_session(conn: &Connection, id: &str) -> Result<usize> {
    Ok(conn.execute("DELETE FROM sessions WHERE id = ?1", [id])?)
}

pub fn delete_sessions_for_user(conn: &Connection, user_id: i64) -> Result<usize> {
    Ok(conn.execute("DELETE FROM sessions WHERE user_id = ?1", [user_id])?)
}

pub fn delete_expired_sessions(conn: &Connection, now: i64) -> Result<usize> {
    Ok(conn.execute("DELETE FROM sessions WHERE expires_at < ?1", [now])?)
}

// -- Lists --

/// Create a list and grant `owner` to its creator in one transaction.
/// An anonymous creator (`owner_id = None`) receives the anonymous owner row.
pub fn insert_list_with_owner(conn: &Connection, name: &str, owner_id: Option<i64>) -> Result<i64> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO lists (name, owner_id) VALUES (?1, ?2)",
        rusqlite::params![name, owner_id],
    )?;
    let list_id = tx.last_insert_rowid();
    upsert_permission(&tx, owner_id, list_id, Role::Owner)?;
    tx.commit()?;
    Ok(list_id)
}

pub fn find_list(conn: &Connection, id: i64) -> Result<Option<ListRow>> {
    let row = conn
        .query_row(
            "SELECT id, name, owner_id, created_at FROM lists WHERE id = ?1",
            [id],
            list_from_row,
        )
        .optional()?;
    Ok(row)
}

/// Lists reachable through the caller's own rows, or the anonymous rows
/// when `user_id` is `None`.
pub fn lists_for(conn: &Connection, user_id: Option<i64>) -> Result<Vec<(ListRow, Role)>> {
    let mut stmt = conn.prepare(
        "SELECT l.id, l.name, l.owner_id, l.created_at, p.role
         FROM lists l
         JOIN permissions p ON p.list_id = l.id
         WHERE p.user_id IS ?1
         ORDER BY l.id",
    )?;

    let rows = stmt
        .query_map([user_id], |row| Ok((list_from_row(row)?, role_at(row, 4)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

pub fn rename_list(conn: &Connection, id: i64, name: &str) -> Result<usize> {
    Ok(conn.execute(
        "UPDATE lists SET name = ?2 WHERE id = ?1",
        rusqlite::params![id, name],
    )?)
}

/// Items and permissions go with the list through cascades.
pub fn delete_list(conn: &Connection, id: i64) -> Result<usize> {
    Ok(conn.execute("DELETE FROM lists WHERE id = ?1", [id])?)
}

/// Lists with no permission rows at all are unreachable, anonymous included.
pub fn delete_orphan_lists(conn: &Connection) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM lists
         WHERE NOT EXISTS (SELECT 1 FROM permissions p WHERE p.list_id = lists.id)",
        [],
    )?)
}

// -- Permissions --

/// The role held on `list_id` by `user_id`, or by the anonymous row when
/// `user_id` is `None`. Only one of the two rows is ever consulted.
pub fn find_role(conn: &Connection, user_id: Option<i64>, list_id: i64) -> Result<Option<Role>> {
    let role = match user_id {
        Some(user_id) => conn
            .query_row(
                "SELECT role FROM permissions WHERE list_id = ?1 AND user_id = ?2",
                rusqlite::params![list_id, user_id],
                |row| role_at(row, 0),
            )
            .optional()?,
        None => conn
            .query_row(
                "SELECT role FROM permissions WHERE list_id = ?1 AND user_id IS NULL",
                [list_id],
                |row| role_at(row, 0),
            )
            .optional()?,
    };
    Ok(role)
}

/// Insert or overwrite the grant for `(user_id, list_id)`.
pub fn upsert_permission(
    conn: &Connection,
    user_id: Option<i64>,
    list_id: i64,
    role: Role,
) -> Result<()> {
    match user_id {
        Some(user_id) => conn.execute(
            "INSERT INTO permissions (user_id, list_id, role) VALUES (?1, ?2, ?3)
             ON CONFLICT (user_id, list_id) DO UPDATE SET role = excluded.role",
            rusqlite::params![user_id, list_id, role.as_str()],
        )?,
        None => conn.execute(
            "INSERT INTO permissions (user_id, list_id, role) VALUES (NULL, ?1, ?2)
             ON CONFLICT (list_id) WHERE user_id IS NULL DO UPDATE SET role = excluded.role",
            rusqlite::params![list_id, role.as_str()],
        )?,
    };
    Ok(())
}

pub fn delete_permission(conn: &Connection, user_id: Option<i64>, list_id: i64) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM permissions WHERE list_id = ?1 AND user_id IS ?2",
        rusqlite::params![list_id, user_id],
    )?)
}

/// Every grant on a list, anonymous row first.
pub fn permissions_for_list(conn: &Connection, list_id: i64) -> Result<Vec<PermissionRow>> {
    let mut stmt = conn.prepare(
        "SELECT p.user_id, u.username, p.list_id, p.role
         FROM permissions p
         LEFT JOIN users u ON u.id = p.user_id
         WHERE p.list_id = ?1
         ORDER BY p.user_id IS NOT NULL, u.username",
    )?;

    let rows = stmt
        .query_map([list_id], |row| {
            Ok(PermissionRow {
                user_id: row.get(0)?,
                username: row.get(1)?,
                list_id: row.get(2)?,
                role: role_at(row, 3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

// -- Items --

pub fn insert_item(
    conn: &Connection,
    list_id: i64,
    name: &str,
    description: Option<&str>,
    state: ItemState,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO items (list_id, name, description, state) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![list_id, name, description, state.as_str()],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn items_for_list(conn: &Connection, list_id: i64) -> Result<Vec<ItemRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, list_id, name, description, state FROM items WHERE list_id = ?1 ORDER BY id",
    )?;

    let rows = stmt
        .query_map([list_id], item_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Items are always addressed through their list.
pub fn find_item(conn: &Connection, list_id: i64, item_id: i64) -> Result<Option<ItemRow>> {
    let row = conn
        .query_row(
            "SELECT id, list_id, name, description, state FROM items
             WHERE list_id = ?1 AND id = ?2",
            [list_id, item_id],
            item_from_row,
        )
        .optional()?;
    Ok(row)
}

pub fn update_item(
    conn: &Connection,
    list_id: i64,
    item_id: i64,
    changes: &ItemChanges,
) -> Result<usize> {
    Ok(conn.execute(
        "UPDATE items SET
             name        = COALESCE(?3, name),
             description = COALESCE(?4, description),
             state       = COALESCE(?5, state)
         WHERE list_id = ?1 AND id = ?2",
        rusqlite::params![
            list_id,
            item_id,
            changes.name,
            changes.description,
            changes.state.map(ItemState::as_str)
        ],
    )?)
}

pub fn delete_item(conn: &Connection, list_id: i64, item_id: i64) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM items WHERE list_id = ?1 AND id = ?2",
        [list_id, item_id],
    )?)
}

// -- Row mapping --

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        salt: row.get(3)?,
        first_name: row.get(4)?,
        last_name: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn list_from_row(row: &Row<'_>) -> rusqlite::Result<ListRow> {
    Ok(ListRow {
        id: row.get(0)?,
        name: row.get(1)?,
        owner_id: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<ItemRow> {
    let state: String = row.get(4)?;
    Ok(ItemRow {
        id: row.get(0)?,
        list_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        state: state
            .parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?,
    })
}

fn role_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Role> {
    let role: String = row.get(idx)?;
    role.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
