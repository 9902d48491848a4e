use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::models::{ItemState, Role};

/// Optional string fields treat `""` the same as an absent value.
fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

// -- Users --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub first_name: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub last_name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub user_id: i64,
    pub token: String,
    pub expiration_date: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateUserRequest {
    #[serde(default, deserialize_with = "blank_as_none")]
    pub username: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub password: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub first_name: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

// -- Sessions --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub token: String,
    pub expiration_date: DateTime<Utc>,
}

/// Plaintext sealed inside a bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPayload {
    pub session_id: String,
}

// -- Lists --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateListRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateListRequest {
    #[serde(default)]
    pub id: Option<f64>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListSummary {
    pub id: i64,
    pub name: String,
    pub owner_id: Option<i64>,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListDetail {
    pub id: i64,
    pub name: String,
    pub owner_id: Option<i64>,
    pub role: Role,
    pub items: Vec<Item>,
}

// -- Permissions --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GrantPermissionRequest {
    #[serde(default, deserialize_with = "blank_as_none")]
    pub username: Option<String>,
    pub role: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RevokePermissionRequest {
    #[serde(default, deserialize_with = "blank_as_none")]
    pub username: Option<String>,
}

/// One grant on a list. `user_id`/`username` are `None` for the anonymous row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionEntry {
    pub user_id: Option<i64>,
    pub username: Option<String>,
    pub role: Role,
}

// -- Items --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateItemRequest {
    pub name: String,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub state: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateItemRequest {
    #[serde(default)]
    pub id: Option<f64>,
    #[serde(default)]
    pub list_id: Option<f64>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub state: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: i64,
    pub list_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub state: ItemState,
}
