//! Error taxonomy for the HTTP layer.
//!
//! Client errors are expected, carry a stable code and are never logged as
//! failures. Internal errors are logged and rendered as a bare 500.

use axum::{
    Json,
    http::{HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::error;

use todo_crypto::CryptoError;
use todo_db::DbError;

pub type ApiResult<T> = Result<T, ApiError>;

/// Stable error codes returned in the `code` field.
pub mod codes {
    pub const INVALID_BODY: &str = "invalid-body";
    pub const MISSING_FIELDS: &str = "missing-fields";
    pub const UNEXPECTED_FIELDS: &str = "unexpected-fields";
    pub const INVALID_AUTH: &str = "invalid-auth";
    pub const MISSING_USER: &str = "missing-user";
    pub const INVALID_PASSWORD: &str = "invalid-password";
    pub const EXPIRED_SESSION: &str = "expired-session";
    pub const AUTH_REQUIRED: &str = "auth-required";
    pub const INSUFFICIENT_PERMS: &str = "insufficient-perms";
    pub const INVALID_ROLE: &str = "invalid-role";
    pub const INVALID_STATE: &str = "invalid-state";
    pub const IMMUTABLE_ID: &str = "immutable-id";
    pub const USERNAME_TAKEN: &str = "username-taken";
    pub const INVALID_ROUTE_PARAM: &str = "invalid-route-param";
    pub const MISSING_ITEM: &str = "missing-item";
    pub const NOT_FOUND: &str = "not-found";
    pub const INTERNAL: &str = "internal-error";
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Client(ClientError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// An expected, caller-attributable failure.
#[derive(Debug, Clone, Error)]
#[error("{code}: {message}")]
pub struct ClientError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub data: Option<Value>,
    pub headers: Vec<(HeaderName, HeaderValue)>,
}

impl ClientError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            data: None,
            headers: Vec::new(),
        }
    }
}

impl ApiError {
    pub fn client(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self::Client(ClientError::new(status, code, message))
    }

    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::client(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn unauthorized(code: &'static str, message: impl Into<String>) -> Self {
        Self::client(StatusCode::UNAUTHORIZED, code, message)
    }

    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        Self::client(StatusCode::NOT_FOUND, code, message)
    }

    pub fn conflict(code: &'static str, message: impl Into<String>) -> Self {
        Self::client(StatusCode::CONFLICT, code, message)
    }

    /// Attach structured detail. No effect on internal errors.
    pub fn with_data(mut self, data: Value) -> Self {
        if let Self::Client(err) = &mut self {
            err.data = Some(data);
        }
        self
    }

    /// Attach a response header. No effect on internal errors.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        if let Self::Client(err) = &mut self {
            err.headers.push((name, value));
        }
        self
    }

    /// Prompt a browser for credentials on a 401.
    pub fn with_basic_challenge(self) -> Self {
        if self.status() != StatusCode::UNAUTHORIZED {
            return self;
        }
        self.with_header(
            header::WWW_AUTHENTICATE,
            HeaderValue::from_static("Basic realm=\"todo\", charset=\"UTF-8\""),
        )
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Client(err) => err.status,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Client(err) => err.code,
            Self::Internal(_) => codes::INTERNAL,
        }
    }
}

impl From<ClientError> for ApiError {
    fn from(err: ClientError) -> Self {
        Self::Client(err)
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        Self::Internal(err.into())
    }
}

impl From<CryptoError> for ApiError {
    fn from(err: CryptoError) -> Self {
        Self::Internal(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Client(err) => {
                let mut body = json!({
                    "success": false,
                    "code": err.code,
                    "message": err.message,
                });
                if let Some(data) = err.data {
                    body["data"] = data;
                }

                let mut response = (err.status, Json(body)).into_response();
                for (name, value) in err.headers {
                    response.headers_mut().append(name, value);
                }
                response
            }
            Self::Internal(err) => {
                error!("Internal error: {:#}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "success": false,
                        "code": codes::INTERNAL,
                        "message": "Internal server error",
                    })),
                )
                    .into_response()
            }
        }
    }
}
