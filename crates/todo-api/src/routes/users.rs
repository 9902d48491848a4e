use std::sync::LazyLock;

use axum::{extract::State, http::HeaderMap, response::Response};
use serde_json::json;
use tracing::info;

use todo_db::DbError;
use todo_db::models::{NewUser, UserChanges};
use todo_db::queries;
use todo_types::api::{RegisterRequest, RegisterResponse, UpdateUserRequest};

use super::{check_username, map_username_conflict, profile};
use crate::auth::{AuthRequirement, Credentials};
use crate::body::{JsonBody, parse_body};
use crate::error::{ApiError, ApiResult, codes};
use crate::response::{created, success};
use crate::state::{self, AppState};
use crate::validate::Shape;

static REGISTER: LazyLock<Shape> = LazyLock::new(|| {
    Shape::object([
        ("username", Shape::string("alice")),
        ("password", Shape::string("correct horse battery staple")),
        ("firstName", Shape::string("Alice").optional()),
        ("lastName", Shape::string("Liddell").optional()),
    ])
});

static UPDATE: LazyLock<Shape> = LazyLock::new(|| {
    Shape::object([
        ("username", Shape::string("alice").optional()),
        ("password", Shape::string("correct horse battery staple").optional()),
        ("firstName", Shape::string("Alice").optional()),
        ("lastName", Shape::string("Liddell").optional()),
    ])
});

/// `POST /users`: create the account and its first session together.
pub async fn register(
    State(state): State<AppState>,
    JsonBody(body): JsonBody,
) -> ApiResult<Response> {
    let req: RegisterRequest = parse_body(body, &REGISTER)?;
    check_username(&req.username)?;

    let response = state::run(&state, move |ctx| {
        let salt = ctx.state.hasher.salt()?;
        let digest = ctx.state.hasher.hash(&req.password, &salt)?;

        let tx = ctx.conn.unchecked_transaction().map_err(DbError::from)?;
        let user_id = queries::insert_user(
            &tx,
            &NewUser {
                username: &req.username,
                password_hash: &digest,
                salt: &salt,
                first_name: req.first_name.as_deref(),
                last_name: req.last_name.as_deref(),
            },
        )
        .map_err(|e| map_username_conflict(e, &req.username))?;
        let session = ctx.open_session(user_id)?;
        tx.commit().map_err(DbError::from)?;

        info!("User registered: {} ({})", req.username, user_id);
        Ok(RegisterResponse {
            user_id,
            token: session.token,
            expiration_date: session.expiration_date,
        })
    })
    .await?;

    Ok(created(response))
}

/// `GET /users`
pub async fn get_user(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Response> {
    let creds = Credentials::from_headers(&headers);

    let user = state::run(&state, move |ctx| {
        let user_id = ctx.authenticate(&creds, AuthRequirement::Required)?.require_user()?;
        queries::find_user_by_id(ctx.conn, user_id)?
            .map(profile)
            .ok_or_else(|| ApiError::not_found(codes::MISSING_USER, "User no longer exists"))
    })
    .await?;

    Ok(success(json!({ "user": user })))
}

/// `PUT /users`: partial profile update. A new password always gets a new salt.
pub async fn update_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonBody(body): JsonBody,
) -> ApiResult<Response> {
    let creds = Credentials::from_headers(&headers);

    let user = state::run(&state, move |ctx| {
        let user_id = ctx.authenticate(&creds, AuthRequirement::Required)?.require_user()?;
        let req: UpdateUserRequest = parse_body(body, &UPDATE)?;
        if let Some(username) = &req.username {
            check_username(username)?;
        }

        let credentials = match &req.password {
            Some(password) => {
                let salt = ctx.state.hasher.salt()?;
                let digest = ctx.state.hasher.hash(password, &salt)?;
                Some((digest.to_vec(), salt.to_vec()))
            }
            None => None,
        };

        let changes = UserChanges {
            username: req.username.clone(),
            first_name: req.first_name,
            last_name: req.last_name,
            credentials,
        };
        queries::update_user(ctx.conn, user_id, &changes).map_err(|e| {
            map_username_conflict(e, req.username.as_deref().unwrap_or_default())
        })?;

        queries::find_user_by_id(ctx.conn, user_id)?
            .map(profile)
            .ok_or_else(|| ApiError::not_found(codes::MISSING_USER, "User no longer exists"))
    })
    .await?;

    Ok(success(json!({ "user": user })))
}

/// `DELETE /users`: needs the password, not just a token.
pub async fn delete_user(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Response> {
    let creds = Credentials::from_headers(&headers);

    state::run(&state, move |ctx| {
        let user_id = ctx.authenticate(&creds, AuthRequirement::Credentials)?.require_user()?;
        queries::delete_user(ctx.conn, user_id)?;
        info!("User deleted: {}", user_id);
        Ok(())
    })
    .await?;

    Ok(success(json!({})))
}
