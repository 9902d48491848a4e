use std::sync::LazyLock;

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::Response,
};
use serde_json::json;

use todo_db::models::ItemChanges;
use todo_db::queries;
use todo_types::api::{CreateItemRequest, UpdateItemRequest};
use todo_types::models::{ItemState, Role};

use super::{check_immutable_id, item};
use crate::auth::{AuthRequirement, Credentials};
use crate::body::{JsonBody, parse_body};
use crate::error::{ApiError, ApiResult, codes};
use crate::response::{created, success};
use crate::state::{self, AppState};
use crate::validate::{Shape, route_id};

static CREATE: LazyLock<Shape> = LazyLock::new(|| {
    Shape::object([
        ("name", Shape::string("Milk")),
        ("description", Shape::string("2 litres, semi-skimmed").optional()),
        ("state", Shape::string("in-progress").optional()),
    ])
});

static UPDATE: LazyLock<Shape> = LazyLock::new(|| {
    Shape::object([
        ("id", Shape::number(1).optional()),
        ("listId", Shape::number(1).optional()),
        ("name", Shape::string("Milk").optional()),
        ("description", Shape::string("2 litres, semi-skimmed").optional()),
        ("state", Shape::string("complete").optional()),
    ])
});

fn parse_state(raw: Option<&str>) -> ApiResult<Option<ItemState>> {
    raw.map(|raw| {
        raw.parse::<ItemState>().map_err(|_| {
            ApiError::bad_request(codes::INVALID_STATE, format!("Unknown item state {raw:?}"))
                .with_data(json!({ "states": ItemState::ALL }))
        })
    })
    .transpose()
}

fn missing_item(list_id: i64, item_id: i64) -> ApiError {
    ApiError::not_found(
        codes::MISSING_ITEM,
        format!("List {list_id} has no item {item_id}"),
    )
}

fn ids(list_id: &str, item_id: &str) -> ApiResult<(i64, i64)> {
    Ok((route_id("listId", list_id)?, route_id("itemId", item_id)?))
}

/// `GET /lists/{list_id}/items`
pub async fn list_items(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(list_id): Path<String>,
) -> ApiResult<Response> {
    let list_id = route_id("listId", &list_id)?;
    let creds = Credentials::from_headers(&headers);

    let items = state::run(&state, move |ctx| {
        let identity = ctx.authenticate(&creds, AuthRequirement::Optional)?;
        ctx.require_role(&identity, list_id, Role::Read)?;
        let rows = queries::items_for_list(ctx.conn, list_id)?;
        Ok(rows.into_iter().map(item).collect::<Vec<_>>())
    })
    .await?;

    Ok(success(json!({ "items": items })))
}

/// `POST /lists/{list_id}/items`
pub async fn create_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(list_id): Path<String>,
    JsonBody(body): JsonBody,
) -> ApiResult<Response> {
    let list_id = route_id("listId", &list_id)?;
    let creds = Credentials::from_headers(&headers);

    let item_id = state::run(&state, move |ctx| {
        let identity = ctx.authenticate(&creds, AuthRequirement::Optional)?;
        ctx.require_role(&identity, list_id, Role::Write)?;

        let req: CreateItemRequest = parse_body(body, &CREATE)?;
        let item_state = parse_state(req.state.as_deref())?.unwrap_or_default();
        let item_id = queries::insert_item(
            ctx.conn,
            list_id,
            &req.name,
            req.description.as_deref(),
            item_state,
        )?;
        Ok(item_id)
    })
    .await?;

    Ok(created(json!({ "itemId": item_id })))
}

/// `GET /lists/{list_id}/items/{item_id}`
pub async fn get_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((list_id, item_id)): Path<(String, String)>,
) -> ApiResult<Response> {
    let (list_id, item_id) = ids(&list_id, &item_id)?;
    let creds = Credentials::from_headers(&headers);

    let found = state::run(&state, move |ctx| {
        let identity = ctx.authenticate(&creds, AuthRequirement::Optional)?;
        ctx.require_role(&identity, list_id, Role::Read)?;
        queries::find_item(ctx.conn, list_id, item_id)?
            .map(item)
            .ok_or_else(|| missing_item(list_id, item_id))
    })
    .await?;

    Ok(success(json!({ "item": found })))
}

/// `PUT /lists/{list_id}/items/{item_id}`: partial update; ids are fixed.
pub async fn update_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((list_id, item_id)): Path<(String, String)>,
    JsonBody(body): JsonBody,
) -> ApiResult<Response> {
    let (list_id, item_id) = ids(&list_id, &item_id)?;
    let creds = Credentials::from_headers(&headers);

    let updated = state::run(&state, move |ctx| {
        let identity = ctx.authenticate(&creds, AuthRequirement::Optional)?;
        ctx.require_role(&identity, list_id, Role::Write)?;

        let req: UpdateItemRequest = parse_body(body, &UPDATE)?;
        check_immutable_id("id", req.id, item_id)?;
        check_immutable_id("listId", req.list_id, list_id)?;

        let changes = ItemChanges {
            state: parse_state(req.state.as_deref())?,
            name: req.name,
            description: req.description,
        };
        if queries::update_item(ctx.conn, list_id, item_id, &changes)? == 0 {
            return Err(missing_item(list_id, item_id));
        }

        queries::find_item(ctx.conn, list_id, item_id)?
            .map(item)
            .ok_or_else(|| missing_item(list_id, item_id))
    })
    .await?;

    Ok(success(json!({ "item": updated })))
}

/// `DELETE /lists/{list_id}/items/{item_id}`
pub async fn delete_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((list_id, item_id)): Path<(String, String)>,
) -> ApiResult<Response> {
    let (list_id, item_id) = ids(&list_id, &item_id)?;
    let creds = Credentials::from_headers(&headers);

    state::run(&state, move |ctx| {
        let identity = ctx.authenticate(&creds, AuthRequirement::Optional)?;
        ctx.require_role(&identity, list_id, Role::Write)?;
        if queries::delete_item(ctx.conn, list_id, item_id)? == 0 {
            return Err(missing_item(list_id, item_id));
        }
        Ok(())
    })
    .await?;

    Ok(success(json!({})))
}
