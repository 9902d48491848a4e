//! Resolves a request's `Authorization` header to an [`Identity`].
//!
//! Two schemes are understood: `Basic` (username and password, checked against
//! the stored Argon2 digest) and `Bearer` (a sealed session token). Which of
//! them a route accepts, and whether it accepts none at all, is expressed by
//! an [`AuthRequirement`].

use anyhow::anyhow;
use axum::http::{HeaderMap, header};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use tracing::debug;
use uuid::Uuid;

use todo_crypto::{Hasher, SALT_LEN, TokenCipher};
use todo_db::queries;
use todo_types::api::{SessionResponse, TokenPayload};

use crate::error::{ApiError, ApiResult, codes};

/// Header browsers never send on their own; its presence marks a
/// programmatic client that should not get a credentials prompt.
const API_CLIENT_HEADER: &str = "x-requested-with";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRequirement {
    /// Anonymous callers pass; a present header is still verified.
    Optional,
    /// Either scheme.
    Required,
    /// `Basic` only.
    Credentials,
    /// `Bearer` only.
    Token,
}

impl AuthRequirement {
    fn allows_credentials(self) -> bool {
        !matches!(self, Self::Token)
    }

    fn allows_token(self) -> bool {
        !matches!(self, Self::Credentials)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthKind {
    None,
    Credentials,
    Token,
}

/// Who is making the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub kind: AuthKind,
    pub user_id: Option<i64>,
    /// Set only for token authentication.
    pub session_id: Option<String>,
}

impl Identity {
    pub fn anonymous() -> Self {
        Self {
            kind: AuthKind::None,
            user_id: None,
            session_id: None,
        }
    }

    pub fn require_user(&self) -> ApiResult<i64> {
        self.user_id
            .ok_or_else(|| ApiError::unauthorized(codes::AUTH_REQUIRED, "Authentication required"))
    }
}

/// The parts of a request the authenticator looks at.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    authorization: Option<String>,
    api_client: bool,
}

impl Credentials {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            authorization: headers
                .get(header::AUTHORIZATION)
                .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned()),
            api_client: headers.contains_key(API_CLIENT_HEADER),
        }
    }
}

enum Scheme<'a> {
    Basic(&'a str),
    Bearer(&'a str),
    Other,
}

fn parse_scheme(header: &str) -> Scheme<'_> {
    let (scheme, param) = header.trim().split_once(' ').unwrap_or((header.trim(), ""));
    let param = param.trim();
    if scheme.eq_ignore_ascii_case("basic") {
        Scheme::Basic(param)
    } else if scheme.eq_ignore_ascii_case("bearer") {
        Scheme::Bearer(param)
    } else {
        Scheme::Other
    }
}

/// Everything needed to verify credentials on one connection.
pub struct Authenticator<'a> {
    pub conn: &'a Connection,
    pub cipher: &'a TokenCipher,
    pub hasher: &'a Hasher,
    pub now: DateTime<Utc>,
}

impl Authenticator<'_> {
    pub fn authenticate(
        &self,
        creds: &Credentials,
        requirement: AuthRequirement,
    ) -> ApiResult<Identity> {
        self.resolve(creds, requirement).map_err(|err| {
            if requirement.allows_credentials() && !creds.api_client {
                err.with_basic_challenge()
            } else {
                err
            }
        })
    }

    fn resolve(&self, creds: &Credentials, requirement: AuthRequirement) -> ApiResult<Identity> {
        let scheme = creds.authorization.as_deref().map(parse_scheme);

        match scheme {
            Some(Scheme::Basic(param)) if requirement.allows_credentials() => self.basic(param),
            Some(Scheme::Bearer(token)) if requirement.allows_token() => self.bearer(token),
            _ if requirement == AuthRequirement::Optional => Ok(Identity::anonymous()),
            _ => {
                debug!("Authentication required but no usable scheme supplied");
                Err(ApiError::unauthorized(
                    codes::AUTH_REQUIRED,
                    "Authentication required",
                ))
            }
        }
    }

    fn basic(&self, param: &str) -> ApiResult<Identity> {
        let invalid = || ApiError::unauthorized(codes::INVALID_AUTH, "Malformed Basic credentials");

        let decoded = BASE64.decode(param).map_err(|_| invalid())?;
        let decoded = String::from_utf8(decoded).map_err(|_| invalid())?;
        let (username, password) = decoded.split_once(':').ok_or_else(invalid)?;

        let Some(user) = queries::find_user_by_username(self.conn, username)? else {
            debug!("Basic auth for unknown user {username:?}");
            return Err(ApiError::unauthorized(
                codes::MISSING_USER,
                format!("No user named {username}"),
            ));
        };

        let salt: &[u8; SALT_LEN] = user
            .salt
            .as_slice()
            .try_into()
            .map_err(|_| anyhow!("stored salt for user {} has length {}", user.id, user.salt.len()))?;

        if !self.hasher.verify(password, salt, &user.password_hash)? {
            debug!("Basic auth with wrong password for user {}", user.id);
            return Err(ApiError::unauthorized(
                codes::INVALID_PASSWORD,
                "Incorrect password",
            ));
        }

        Ok(Identity {
            kind: AuthKind::Credentials,
            user_id: Some(user.id),
            session_id: None,
        })
    }

    fn bearer(&self, token: &str) -> ApiResult<Identity> {
        let payload: TokenPayload = self
            .cipher
            .open(token)
            .map_err(|_| ApiError::unauthorized(codes::INVALID_AUTH, "Invalid token"))?;

        let Some(session) =
            queries::find_live_session(self.conn, &payload.session_id, self.now.timestamp_millis())?
        else {
            debug!("Bearer token for expired or unknown session");
            return Err(ApiError::unauthorized(
                codes::EXPIRED_SESSION,
                "Session has expired; log in again",
            ));
        };

        Ok(Identity {
            kind: AuthKind::Token,
            user_id: Some(session.user_id),
            session_id: Some(session.id),
        })
    }
}

/// Create a session for `user_id` and seal its id into a bearer token.
pub fn open_session(
    conn: &Connection,
    cipher: &TokenCipher,
    user_id: i64,
    ttl: Duration,
    now: DateTime<Utc>,
) -> ApiResult<SessionResponse> {
    let session_id = Uuid::new_v4().to_string();
    let expires_at = now
        .checked_add_signed(ttl)
        .ok_or_else(|| anyhow!("session lifetime {ttl} overflows the clock"))?;

    queries::insert_session(conn, &session_id, user_id, expires_at.timestamp_millis())?;
    let token = cipher.seal(&TokenPayload { session_id })?;

    Ok(SessionResponse {
        token,
        expiration_date: expires_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, StatusCode};
    use todo_crypto::HashParams;
    use todo_crypto::keys::generate_secret_key;
    use todo_db::Database;
    use todo_db::models::NewUser;

    struct Fixture {
        db: Database,
        cipher: TokenCipher,
        hasher: Hasher,
        alice: i64,
    }

    fn fixture() -> Fixture {
        let db = Database::open_in_memory().unwrap();
        let cipher = TokenCipher::new(&generate_secret_key().unwrap());
        let hasher = Hasher::new(HashParams {
            memory_kib: 64,
            iterations: 1,
            parallelism: 1,
        })
        .unwrap();

        let salt = hasher.salt().unwrap();
        let digest = hasher.hash("secret", &salt).unwrap();
        let alice = db
            .with_conn(|conn| {
                queries::insert_user(
                    conn,
                    &NewUser {
                        username: "alice",
                        password_hash: &digest,
                        salt: &salt,
                        first_name: None,
                        last_name: None,
                    },
                )
            })
            .unwrap();

        Fixture {
            db,
            cipher,
            hasher,
            alice,
        }
    }

    fn headers(authorization: Option<&str>, api_client: bool) -> Credentials {
        let mut map = HeaderMap::new();
        if let Some(value) = authorization {
            map.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        }
        if api_client {
            map.insert(API_CLIENT_HEADER, HeaderValue::from_static("XMLHttpRequest"));
        }
        Credentials::from_headers(&map)
    }

    fn basic(username: &str, password: &str) -> String {
        format!("Basic {}", BASE64.encode(format!("{username}:{password}")))
    }

    fn run(
        fx: &Fixture,
        creds: &Credentials,
        requirement: AuthRequirement,
        now: DateTime<Utc>,
    ) -> ApiResult<Identity> {
        fx.db.with_conn(|conn| {
            Authenticator {
                conn,
                cipher: &fx.cipher,
                hasher: &fx.hasher,
                now,
            }
            .authenticate(creds, requirement)
        })
    }

    fn challenged(err: &ApiError) -> bool {
        match err {
            ApiError::Client(client) => client
                .headers
                .iter()
                .any(|(name, _)| name == header::WWW_AUTHENTICATE),
            ApiError::Internal(_) => false,
        }
    }

    #[test]
    fn basic_credentials_resolve_user() {
        let fx = fixture();
        let identity = run(
            &fx,
            &headers(Some(&basic("alice", "secret")), false),
            AuthRequirement::Credentials,
            Utc::now(),
        )
        .unwrap();
        assert_eq!(identity.kind, AuthKind::Credentials);
        assert_eq!(identity.user_id, Some(fx.alice));
        assert!(identity.session_id.is_none());
    }

    #[test]
    fn password_may_contain_colons() {
        let fx = fixture();
        let result = run(
            &fx,
            &headers(Some(&basic("alice", "sec:ret")), false),
            AuthRequirement::Required,
            Utc::now(),
        );
        assert_eq!(result.unwrap_err().code(), codes::INVALID_PASSWORD);
    }

    #[test]
    fn unknown_user_and_wrong_password_are_distinct_401s() {
        let fx = fixture();
        let now = Utc::now();

        let err = run(&fx, &headers(Some(&basic("bob", "secret")), false), AuthRequirement::Required, now)
            .unwrap_err();
        assert_eq!(err.code(), codes::MISSING_USER);
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        let err = run(&fx, &headers(Some(&basic("alice", "nope")), false), AuthRequirement::Required, now)
            .unwrap_err();
        assert_eq!(err.code(), codes::INVALID_PASSWORD);
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn malformed_basic_is_invalid_auth() {
        let fx = fixture();
        let no_colon = format!("Basic {}", BASE64.encode("no-colon"));
        for value in ["Basic !!!", no_colon.as_str()] {
            let err = run(&fx, &headers(Some(value), false), AuthRequirement::Required, Utc::now())
                .unwrap_err();
            assert_eq!(err.code(), codes::INVALID_AUTH, "{value}");
        }
    }

    #[test]
    fn bearer_token_resolves_session() {
        let fx = fixture();
        let now = Utc::now();
        let session = fx
            .db
            .with_conn(|conn| open_session(conn, &fx.cipher, fx.alice, Duration::hours(1), now))
            .unwrap();

        let identity = run(
            &fx,
            &headers(Some(&format!("Bearer {}", session.token)), false),
            AuthRequirement::Token,
            now,
        )
        .unwrap();
        assert_eq!(identity.kind, AuthKind::Token);
        assert_eq!(identity.user_id, Some(fx.alice));
        assert!(identity.session_id.is_some());
    }

    #[test]
    fn expired_session_is_rejected() {
        let fx = fixture();
        let now = Utc::now();
        let session = fx
            .db
            .with_conn(|conn| open_session(conn, &fx.cipher, fx.alice, Duration::seconds(1), now))
            .unwrap();
        let creds = headers(Some(&format!("Bearer {}", session.token)), false);

        let err = run(&fx, &creds, AuthRequirement::Required, now + Duration::seconds(2)).unwrap_err();
        assert_eq!(err.code(), codes::EXPIRED_SESSION);

        // expiry is exclusive: a session is dead at its expiration instant
        let err = run(&fx, &creds, AuthRequirement::Required, session.expiration_date).unwrap_err();
        assert_eq!(err.code(), codes::EXPIRED_SESSION);
    }

    #[test]
    fn session_past_the_end_of_time_is_an_internal_error() {
        let fx = fixture();
        let now = DateTime::<Utc>::MAX_UTC - Duration::hours(1);
        let err = fx
            .db
            .with_conn(|conn| open_session(conn, &fx.cipher, fx.alice, Duration::hours(2), now))
            .unwrap_err();
        assert!(matches!(err, ApiError::Internal(_)));

        // nothing was stored for the failed attempt
        let stored = fx
            .db
            .with_conn(|conn| queries::delete_expired_sessions(conn, i64::MAX))
            .unwrap();
        assert_eq!(stored, 0);
    }

    #[test]
    fn tampered_token_is_invalid_auth() {
        let fx = fixture();
        let err = run(
            &fx,
            &headers(Some("Bearer AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA"), false),
            AuthRequirement::Token,
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err.code(), codes::INVALID_AUTH);
    }

    #[test]
    fn optional_without_header_is_anonymous() {
        let fx = fixture();
        let identity = run(&fx, &headers(None, false), AuthRequirement::Optional, Utc::now()).unwrap();
        assert_eq!(identity, Identity::anonymous());
        assert_eq!(identity.require_user().unwrap_err().code(), codes::AUTH_REQUIRED);
    }

    #[test]
    fn optional_still_verifies_a_present_header() {
        let fx = fixture();
        let err = run(
            &fx,
            &headers(Some(&basic("alice", "wrong")), false),
            AuthRequirement::Optional,
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err.code(), codes::INVALID_PASSWORD);
    }

    #[test]
    fn scheme_restriction_is_enforced() {
        let fx = fixture();
        let err = run(
            &fx,
            &headers(Some(&basic("alice", "secret")), false),
            AuthRequirement::Token,
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err.code(), codes::AUTH_REQUIRED);
        // token-only routes never prompt for a password
        assert!(!challenged(&err));
    }

    #[test]
    fn challenge_is_suppressed_for_api_clients() {
        let fx = fixture();
        let err = run(&fx, &headers(None, false), AuthRequirement::Required, Utc::now()).unwrap_err();
        assert!(challenged(&err));

        let err = run(&fx, &headers(None, true), AuthRequirement::Required, Utc::now()).unwrap_err();
        assert!(!challenged(&err));
    }
}
