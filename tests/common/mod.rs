#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use bearer_gate::{
    ServerConfig,
    auth::{Authority, DEFAULT_EXEMPT_PREFIXES},
    create_app,
    db::Database,
    jwt::{TokenClaims, TokenCodec, TokenTtl},
    password::hash_password,
};
use std::collections::BTreeSet;
use std::time::{SystemTime, UNIX_EPOCH};
use tower::ServiceExt;
use uuid::Uuid;

pub const JWT_SECRET: &[u8] = b"integration-test-secret-0123456789abcdef";

pub struct TestApp {
    pub app: Router,
    pub db: Database,
    pub codec: TokenCodec,
}

pub fn test_config(db: Database) -> ServerConfig {
    ServerConfig {
        db,
        jwt_secret: JWT_SECRET.to_vec(),
        token_ttl: TokenTtl::default(),
        exempt_prefixes: DEFAULT_EXEMPT_PREFIXES
            .iter()
            .map(|p| p.to_string())
            .collect(),
        prune_expired_refresh: false,
    }
}

pub async fn create_test_app() -> TestApp {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    TestApp {
        app: create_app(&test_config(db.clone())),
        db,
        codec: TokenCodec::new(JWT_SECRET, TokenTtl::default()),
    }
}

/// Insert a member directly, bypassing the signup endpoint.
pub async fn create_member(db: &Database, email: &str, password: &str, admin: bool) {
    let mut authorities = BTreeSet::from([Authority::User]);
    if admin {
        authorities.insert(Authority::Admin);
    }
    let hash = hash_password(password).expect("Failed to hash password");
    db.members()
        .create(email, "tester", &hash, &authorities)
        .await
        .expect("Failed to create member");
}

pub fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// Sign an already expired token for `subject` with the codec's key.
pub fn expired_token(codec: &TokenCodec, subject: &str, auth: &str) -> String {
    codec
        .encode(&TokenClaims {
            sub: subject.to_string(),
            jti: Uuid::new_v4().to_string(),
            auth: Some(auth.to_string()),
            iat: now() - 120,
            exp: now() - 60,
        })
        .unwrap()
}

/// Send a request and return the status and body.
/// Non-JSON bodies come back as a JSON string.
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    bearer: Option<&str>,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or_else(|_| {
        serde_json::Value::String(String::from_utf8_lossy(&bytes).into_owned())
    });
    (status, json)
}

/// Log in and return (accessToken, refreshToken).
pub async fn login(app: &Router, email: &str, password: &str) -> (String, String) {
    let (status, json) = send(
        app,
        "POST",
        "/auth/login",
        None,
        Some(serde_json::json!({ "email": email, "password": password })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {}", json);
    (
        json["accessToken"].as_str().unwrap().to_string(),
        json["refreshToken"].as_str().unwrap().to_string(),
    )
}
