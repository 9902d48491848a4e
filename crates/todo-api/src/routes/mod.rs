pub mod items;
pub mod lists;
pub mod permissions;
pub mod sessions;
pub mod users;

use axum::{
    http::{Method, Uri},
    response::Response,
};
use serde_json::json;

use todo_db::DbError;
use todo_db::models::{ItemRow, PermissionRow, UserRow};
use todo_types::api::{Item, PermissionEntry, UserProfile};

use crate::error::{ApiError, ApiResult, codes};
use crate::response::success;

pub async fn health() -> Response {
    success(json!({ "status": "ok" }))
}

pub async fn not_found(method: Method, uri: Uri) -> ApiError {
    ApiError::not_found(codes::NOT_FOUND, format!("No route for {method} {}", uri.path()))
}

fn profile(row: UserRow) -> UserProfile {
    UserProfile {
        id: row.id,
        username: row.username,
        first_name: row.first_name,
        last_name: row.last_name,
    }
}

fn item(row: ItemRow) -> Item {
    Item {
        id: row.id,
        list_id: row.list_id,
        name: row.name,
        description: row.description,
        state: row.state,
    }
}

fn permission_entry(row: PermissionRow) -> PermissionEntry {
    PermissionEntry {
        user_id: row.user_id,
        username: row.username,
        role: row.role,
    }
}

/// Usernames are the only unique column a client can collide on.
fn map_username_conflict(err: DbError, username: &str) -> ApiError {
    if err.is_unique_violation() {
        ApiError::conflict(
            codes::USERNAME_TAKEN,
            format!("Username {username} is already taken"),
        )
    } else {
        err.into()
    }
}

/// `:` would make Basic credentials ambiguous.
fn check_username(username: &str) -> ApiResult<()> {
    if username.contains(':') {
        return Err(ApiError::bad_request(
            codes::INVALID_BODY,
            "username cannot contain ':'",
        )
        .with_data(json!({ "path": "username" })));
    }
    Ok(())
}

/// Ids in a body may repeat the route id but never change it.
fn check_immutable_id(field: &str, sent: Option<f64>, actual: i64) -> ApiResult<()> {
    match sent {
        Some(sent) if sent != actual as f64 => Err(ApiError::bad_request(
            codes::IMMUTABLE_ID,
            format!("{field} cannot be changed"),
        )
        .with_data(json!({ "field": field, "expected": actual, "actual": sent }))),
        _ => Ok(()),
    }
}
