use std::sync::Arc;

use anyhow::anyhow;
use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;

use todo_crypto::{Hasher, TokenCipher};
use todo_db::Database;
use todo_types::api::SessionResponse;
use todo_types::models::Role;

use crate::auth::{self, AuthRequirement, Authenticator, Credentials, Identity};
use crate::error::ApiResult;
use crate::permissions;

pub type AppState = Arc<AppStateInner>;

/// Process-wide state, built once at startup and immutable afterwards.
pub struct AppStateInner {
    pub db: Database,
    pub cipher: TokenCipher,
    pub hasher: Hasher,
    pub session_ttl: Duration,
}

/// One request's view of the store: a single pooled connection plus the
/// clock reading taken when the request started its store work.
pub struct Ctx<'a> {
    pub state: &'a AppStateInner,
    pub conn: &'a Connection,
    pub now: DateTime<Utc>,
}

impl Ctx<'_> {
    pub fn authenticate(
        &self,
        creds: &Credentials,
        requirement: AuthRequirement,
    ) -> ApiResult<Identity> {
        Authenticator {
            conn: self.conn,
            cipher: &self.state.cipher,
            hasher: &self.state.hasher,
            now: self.now,
        }
        .authenticate(creds, requirement)
    }

    pub fn require_role(&self, identity: &Identity, list_id: i64, required: Role) -> ApiResult<Role> {
        permissions::check(self.conn, identity.user_id, list_id, required)
    }

    pub fn open_session(&self, user_id: i64) -> ApiResult<SessionResponse> {
        auth::open_session(
            self.conn,
            &self.state.cipher,
            user_id,
            self.state.session_ttl,
            self.now,
        )
    }
}

/// Run `f` on the blocking pool with one connection checked out for its
/// whole duration. The connection returns to the pool when `f` does.
pub async fn run<F, T>(state: &AppState, f: F) -> ApiResult<T>
where
    F: FnOnce(&Ctx<'_>) -> ApiResult<T> + Send + 'static,
    T: Send + 'static,
{
    let state = Arc::clone(state);
    tokio::task::spawn_blocking(move || {
        state.db.with_conn(|conn| {
            let ctx = Ctx {
                state: &state,
                conn,
                now: Utc::now(),
            };
            f(&ctx)
        })
    })
    .await
    .map_err(|e| anyhow!("request task failed: {e}"))?
}
