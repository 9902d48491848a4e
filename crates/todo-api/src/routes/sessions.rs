use axum::{extract::State, http::HeaderMap, response::Response};
use serde_json::json;
use tracing::debug;

use todo_db::queries;

use crate::auth::{AuthKind, AuthRequirement, Credentials};
use crate::error::ApiResult;
use crate::response::{created, success};
use crate::state::{self, AppState};

/// `POST /sessions`: log in with Basic credentials, get a bearer token.
pub async fn create_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let creds = Credentials::from_headers(&headers);

    let session = state::run(&state, move |ctx| {
        let user_id = ctx.authenticate(&creds, AuthRequirement::Credentials)?.require_user()?;
        let session = ctx.open_session(user_id)?;
        debug!("Session opened for user {}", user_id);
        Ok(session)
    })
    .await?;

    Ok(created(session))
}

/// `DELETE /sessions`: with a token, end that session; with credentials,
/// end every session the user has.
pub async fn delete_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let creds = Credentials::from_headers(&headers);

    let removed = state::run(&state, move |ctx| {
        let identity = ctx.authenticate(&creds, AuthRequirement::Required)?;
        let user_id = identity.require_user()?;

        let removed = match (identity.kind, identity.session_id.as_deref()) {
            (AuthKind::Token, Some(session_id)) => queries::delete_session(ctx.conn, session_id)?,
            _ => queries::delete_sessions_for_user(ctx.conn, user_id)?,
        };
        debug!("Removed {} sessions for user {}", removed, user_id);
        Ok(removed)
    })
    .await?;

    Ok(success(json!({ "removed": removed })))
}
