pub mod api;
pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod credentials;
pub mod db;
pub mod jwt;
pub mod password;
pub mod service;

use api::create_api_router;
use auth::{AuthGate, ExemptPaths, authenticate};
use axum::{Router, middleware};
use credentials::DbCredentialVerifier;
use db::Database;
use jwt::{TokenCodec, TokenTtl};
use service::AuthService;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// Decoded HS512 signing secret
    pub jwt_secret: Vec<u8>,
    /// Lifetimes of issued access and refresh tokens
    pub token_ttl: TokenTtl,
    /// Path prefixes that bypass the authenticator
    pub exempt_prefixes: Vec<String>,
    /// Whether expired refresh records are pruned in the background
    pub prune_expired_refresh: bool,
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    let codec = Arc::new(TokenCodec::new(&config.jwt_secret, config.token_ttl));
    let verifier = Arc::new(DbCredentialVerifier::new(config.db.clone()));
    let service = AuthService::new(config.db.clone(), codec.clone(), verifier);

    let gate = AuthGate::new(codec, ExemptPaths::new(config.exempt_prefixes.iter().cloned()));

    // Applied to the whole router so unmatched paths are authenticated too.
    create_api_router(config.db.clone(), service)
        .layer(middleware::from_fn_with_state(gate, authenticate))
}

/// Run cleanup tasks and spawn background scheduler when pruning is enabled.
/// Call this before starting the server.
pub async fn init_cleanup(config: &ServerConfig) {
    if !config.prune_expired_refresh {
        return;
    }
    cleanup::run_cleanup(&config.db).await;
    cleanup::spawn_cleanup_scheduler(config.db.clone());
}

/// Run the server on the given listener. This function blocks until the server exits.
/// Call `init_cleanup` before this to run cleanup on startup.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}
