//! HTTP surfaces: the cached public site and the administrative API.

mod admin;
mod middleware;
mod public;

pub use admin::{AdminState, build_admin_router};
pub use middleware::RequestContext;
pub use public::{PublicState, build_public_router};

use axum::http::StatusCode;

async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}
