use std::sync::LazyLock;

use anyhow::anyhow;
use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::Response,
};
use serde_json::json;
use tracing::info;

use todo_db::queries;
use todo_types::api::{CreateListRequest, ListDetail, ListSummary, UpdateListRequest};
use todo_types::models::Role;

use super::{check_immutable_id, item};
use crate::auth::{AuthRequirement, Credentials};
use crate::body::{JsonBody, parse_body};
use crate::error::ApiResult;
use crate::response::{created, success};
use crate::state::{self, AppState};
use crate::validate::{Shape, route_id};

static CREATE: LazyLock<Shape> =
    LazyLock::new(|| Shape::object([("name", Shape::string("Groceries"))]));

static UPDATE: LazyLock<Shape> = LazyLock::new(|| {
    Shape::object([
        ("id", Shape::number(1).optional()),
        ("name", Shape::string("Groceries").optional()),
    ])
});

/// `GET /lists`: lists reachable through the caller's own grants, or
/// through the public grants when anonymous.
pub async fn list_lists(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Response> {
    let creds = Credentials::from_headers(&headers);

    let lists = state::run(&state, move |ctx| {
        let identity = ctx.authenticate(&creds, AuthRequirement::Optional)?;
        let lists = queries::lists_for(ctx.conn, identity.user_id)?
            .into_iter()
            .map(|(row, role)| ListSummary {
                id: row.id,
                name: row.name,
                owner_id: row.owner_id,
                role,
            })
            .collect::<Vec<_>>();
        Ok(lists)
    })
    .await?;

    Ok(success(json!({ "lists": lists })))
}

/// `POST /lists`: the creator, or the public when anonymous, owns the list.
pub async fn create_list(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonBody(body): JsonBody,
) -> ApiResult<Response> {
    let creds = Credentials::from_headers(&headers);

    let list_id = state::run(&state, move |ctx| {
        let identity = ctx.authenticate(&creds, AuthRequirement::Optional)?;
        let req: CreateListRequest = parse_body(body, &CREATE)?;
        let list_id = queries::insert_list_with_owner(ctx.conn, &req.name, identity.user_id)?;
        info!("List created: {} ({}) by {:?}", req.name, list_id, identity.user_id);
        Ok(list_id)
    })
    .await?;

    Ok(created(json!({ "listId": list_id })))
}

/// `GET /lists/{list_id}`
pub async fn get_list(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(list_id): Path<String>,
) -> ApiResult<Response> {
    let list_id = route_id("listId", &list_id)?;
    let creds = Credentials::from_headers(&headers);

    let list = state::run(&state, move |ctx| {
        let identity = ctx.authenticate(&creds, AuthRequirement::Optional)?;
        let role = ctx.require_role(&identity, list_id, Role::Read)?;

        let row = queries::find_list(ctx.conn, list_id)?
            .ok_or_else(|| anyhow!("list {list_id} has a grant but no row"))?;
        let items = queries::items_for_list(ctx.conn, list_id)?
            .into_iter()
            .map(item)
            .collect();

        Ok(ListDetail {
            id: row.id,
            name: row.name,
            owner_id: row.owner_id,
            role,
            items,
        })
    })
    .await?;

    Ok(success(json!({ "list": list })))
}

/// `PUT /lists/{list_id}`: rename. The id may be echoed back but not changed.
pub async fn update_list(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(list_id): Path<String>,
    JsonBody(body): JsonBody,
) -> ApiResult<Response> {
    let list_id = route_id("listId", &list_id)?;
    let creds = Credentials::from_headers(&headers);

    state::run(&state, move |ctx| {
        let identity = ctx.authenticate(&creds, AuthRequirement::Optional)?;
        ctx.require_role(&identity, list_id, Role::Write)?;

        let req: UpdateListRequest = parse_body(body, &UPDATE)?;
        check_immutable_id("id", req.id, list_id)?;
        if let Some(name) = &req.name {
            queries::rename_list(ctx.conn, list_id, name)?;
        }
        Ok(())
    })
    .await?;

    Ok(success(json!({})))
}

/// `DELETE /lists/{list_id}`: items and grants go with it.
pub async fn delete_list(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(list_id): Path<String>,
) -> ApiResult<Response> {
    let list_id = route_id("listId", &list_id)?;
    let creds = Credentials::from_headers(&headers);

    state::run(&state, move |ctx| {
        let identity = ctx.authenticate(&creds, AuthRequirement::Optional)?;
        ctx.require_role(&identity, list_id, Role::Owner)?;
        queries::delete_list(ctx.conn, list_id)?;
        info!("List deleted: {}", list_id);
        Ok(())
    })
    .await?;

    Ok(success(json!({})))
}
