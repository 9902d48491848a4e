use axum::{
    Router,
    routing::{get, post},
};

use crate::routes::{self, items, lists, permissions, sessions, users};
use crate::state::AppState;

/// All API routes. Transport layers (CORS, tracing) are added by the binary.
pub fn build(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route(
            "/users",
            get(users::get_user)
                .post(users::register)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        .route(
            "/sessions",
            post(sessions::create_session).delete(sessions::delete_session),
        )
        .route("/lists", get(lists::list_lists).post(lists::create_list))
        .route(
            "/lists/{list_id}",
            get(lists::get_list)
                .put(lists::update_list)
                .delete(lists::delete_list),
        )
        .route(
            "/lists/{list_id}/permissions",
            get(permissions::list_permissions)
                .put(permissions::grant_permission)
                .delete(permissions::revoke_permission),
        )
        .route(
            "/lists/{list_id}/items",
            get(items::list_items).post(items::create_item),
        )
        .route(
            "/lists/{list_id}/items/{item_id}",
            get(items::get_item)
                .put(items::update_item)
                .delete(items::delete_item),
        )
        .fallback(routes::not_found)
        .with_state(state)
}
