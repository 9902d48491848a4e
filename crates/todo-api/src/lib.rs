pub mod auth;
pub mod body;
pub mod error;
pub mod permissions;
pub mod purge;
pub mod response;
pub mod router;
pub mod routes;
pub mod state;
pub mod validate;

pub use error::{ApiError, ApiResult, ClientError};
pub use state::{AppState, AppStateInner};
