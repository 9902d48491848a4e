use std::sync::LazyLock;

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::Response,
};
use rusqlite::Connection;
use serde_json::json;
use tracing::info;

use todo_db::queries;
use todo_types::api::{GrantPermissionRequest, PermissionEntry, RevokePermissionRequest};
use todo_types::models::Role;

use super::permission_entry;
use crate::auth::{AuthRequirement, Credentials};
use crate::body::{JsonBody, parse_body, parse_optional_body};
use crate::error::{ApiError, ApiResult, codes};
use crate::response::success;
use crate::state::{self, AppState};
use crate::validate::{Shape, route_id};

static GRANT: LazyLock<Shape> = LazyLock::new(|| {
    Shape::object([
        ("username", Shape::string("bob").optional()),
        ("role", Shape::string("write")),
    ])
});

static REVOKE: LazyLock<Shape> = LazyLock::new(|| {
    Shape::object([("username", Shape::string("bob").optional())]).optional()
});

/// `None` addresses the anonymous grant.
fn resolve_grantee(conn: &Connection, username: Option<&str>) -> ApiResult<Option<i64>> {
    let Some(username) = username else {
        return Ok(None);
    };
    queries::find_user_by_username(conn, username)?
        .map(|user| Some(user.id))
        .ok_or_else(|| {
            ApiError::not_found(codes::MISSING_USER, format!("No user named {username}"))
                .with_data(json!({ "username": username }))
        })
}

/// `GET /lists/{list_id}/permissions`
pub async fn list_permissions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(list_id): Path<String>,
) -> ApiResult<Response> {
    let list_id = route_id("listId", &list_id)?;
    let creds = Credentials::from_headers(&headers);

    let permissions = state::run(&state, move |ctx| {
        let identity = ctx.authenticate(&creds, AuthRequirement::Optional)?;
        ctx.require_role(&identity, list_id, Role::Owner)?;
        let rows = queries::permissions_for_list(ctx.conn, list_id)?;
        Ok(rows.into_iter().map(permission_entry).collect::<Vec<_>>())
    })
    .await?;

    Ok(success(json!({ "permissions": permissions })))
}

/// `PUT /lists/{list_id}/permissions`: grant or change a role.
pub async fn grant_permission(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(list_id): Path<String>,
    JsonBody(body): JsonBody,
) -> ApiResult<Response> {
    let list_id = route_id("listId", &list_id)?;
    let creds = Credentials::from_headers(&headers);

    let entry = state::run(&state, move |ctx| {
        let identity = ctx.authenticate(&creds, AuthRequirement::Optional)?;
        ctx.require_role(&identity, list_id, Role::Owner)?;

        let req: GrantPermissionRequest = parse_body(body, &GRANT)?;
        let role: Role = req.role.parse().map_err(|_| {
            ApiError::bad_request(codes::INVALID_ROLE, format!("Unknown role {:?}", req.role))
                .with_data(json!({ "roles": Role::ALL }))
        })?;
        let user_id = resolve_grantee(ctx.conn, req.username.as_deref())?;

        queries::upsert_permission(ctx.conn, user_id, list_id, role)?;
        info!("List {}: granted {} to {:?}", list_id, role, user_id);
        Ok(PermissionEntry {
            user_id,
            username: req.username,
            role,
        })
    })
    .await?;

    Ok(success(json!({ "permission": entry })))
}

/// `DELETE /lists/{list_id}/permissions`: idempotent; an omitted username
/// removes the anonymous grant.
pub async fn revoke_permission(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(list_id): Path<String>,
    JsonBody(body): JsonBody,
) -> ApiResult<Response> {
    let list_id = route_id("listId", &list_id)?;
    let creds = Credentials::from_headers(&headers);

    let removed = state::run(&state, move |ctx| {
        let identity = ctx.authenticate(&creds, AuthRequirement::Optional)?;
        ctx.require_role(&identity, list_id, Role::Owner)?;

        let req: RevokePermissionRequest = parse_optional_body(body, &REVOKE)?;
        let user_id = resolve_grantee(ctx.conn, req.username.as_deref())?;
        let removed = queries::delete_permission(ctx.conn, user_id, list_id)?;
        info!("List {}: revoked grant of {:?} ({} rows)", list_id, user_id, removed);
        Ok(removed)
    })
    .await?;

    Ok(success(json!({ "removed": removed })))
}
