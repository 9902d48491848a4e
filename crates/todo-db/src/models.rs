//! Row types as stored in SQLite. API-facing models live in `todo-types`.

use todo_types::models::{ItemState, Role};

pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub password_hash: Vec<u8>,
    pub salt: Vec<u8>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub created_at: String,
}

pub struct NewUser<'a> {
    pub username: &'a str,
    pub password_hash: &'a [u8],
    pub salt: &'a [u8],
    pub first_name: Option<&'a str>,
    pub last_name: Option<&'a str>,
}

/// Column updates for a user; `None` leaves the column untouched.
#[derive(Default)]
pub struct UserChanges {
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// New `(password_hash, salt)` pair, always replaced together.
    pub credentials: Option<(Vec<u8>, Vec<u8>)>,
}

pub struct SessionRow {
    pub id: String,
    pub user_id: i64,
    /// Unix epoch milliseconds.
    pub expires_at: i64,
}

pub struct ListRow {
    pub id: i64,
    pub name: String,
    pub owner_id: Option<i64>,
    pub created_at: String,
}

pub struct PermissionRow {
    pub user_id: Option<i64>,
    pub username: Option<String>,
    pub list_id: i64,
    pub role: Role,
}

pub struct ItemRow {
    pub id: i64,
    pub list_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub state: ItemState,
}

#[derive(Default)]
pub struct ItemChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub state: Option<ItemState>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub sessions: usize,
    pub lists: usize,
}
