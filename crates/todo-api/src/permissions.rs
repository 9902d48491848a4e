use rusqlite::Connection;
use tracing::debug;

use todo_db::queries;
use todo_types::models::Role;

use crate::error::{ApiError, ApiResult, codes};

/// Require `user_id` (or the anonymous row when `None`) to hold at least
/// `required` on `list_id`, returning the role actually held.
///
/// Exactly one row is consulted: an identified caller never falls back to the
/// anonymous grant. A missing list looks the same as a missing grant.
pub fn check(
    conn: &Connection,
    user_id: Option<i64>,
    list_id: i64,
    required: Role,
) -> ApiResult<Role> {
    match queries::find_role(conn, user_id, list_id)? {
        Some(role) if role.satisfies(required) => Ok(role),
        held => {
            debug!(?user_id, list_id, ?held, %required, "Permission denied");
            Err(ApiError::unauthorized(
                codes::INSUFFICIENT_PERMS,
                format!("This action requires the {required} role on list {list_id}"),
            ))
        }
    }
}
