mod auth;
mod error;
mod members;

use axum::Router;

use crate::db::Database;
use crate::service::AuthService;

/// Create the application routes. Authentication is layered on by the caller.
pub fn create_api_router(db: Database, service: AuthService) -> Router {
    Router::new()
        .nest("/auth", auth::router(service))
        .nest("/member", members::router(db))
}
