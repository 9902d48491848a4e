use axum::{
    body::Bytes,
    extract::{FromRequest, Request},
    http::header,
};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{ApiError, ApiResult, codes};
use crate::validate::{Shape, validate};

/// Raw JSON request body.
///
/// `None` when the request has no body or did not declare a JSON content
/// type, so validation can tell "forgot the header" apart from bad input.
#[derive(Debug, Clone, Default)]
pub struct JsonBody(pub Option<Value>);

impl<S> FromRequest<S> for JsonBody
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(is_json_content_type);

        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| ApiError::client(e.status(), codes::INVALID_BODY, e.body_text()))?;

        if !is_json || bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self(None));
        }

        let value = serde_json::from_slice(&bytes).map_err(|e| {
            ApiError::bad_request(codes::INVALID_BODY, format!("Malformed JSON body: {e}"))
        })?;
        Ok(Self(Some(value)))
    }
}

fn is_json_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == "application/json"
        || (essence.starts_with("application/") && essence.ends_with("+json"))
}

/// Validate against `shape`, then deserialize into the typed request.
pub fn parse_body<T: DeserializeOwned>(body: Option<Value>, shape: &Shape) -> ApiResult<T> {
    let value = validate(body, shape)?;
    serde_json::from_value(value)
        .map_err(|e| ApiError::bad_request(codes::INVALID_BODY, e.to_string()))
}

/// Like [`parse_body`] for requests whose whole body may be omitted.
pub fn parse_optional_body<T>(body: Option<Value>, shape: &Shape) -> ApiResult<T>
where
    T: DeserializeOwned + Default,
{
    match body {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => parse_body(Some(value), shape),
    }
}
