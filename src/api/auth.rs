//! Public authentication endpoints, mounted under the exempt `/auth` prefix.
//!
//! - POST `/signup` - Register a member with `ROLE_USER`
//! - POST `/login` - Exchange email and password for a token pair
//! - POST `/reissue` - Rotate a token pair using the current refresh token

use axum::{Json, Router, extract::State, routing::post};
use serde::{Deserialize, Serialize};

use crate::auth::AuthError;
use crate::jwt::TokenPair;
use crate::service::{AuthService, Signup};

pub fn router(service: AuthService) -> Router {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/reissue", post(reissue))
        .with_state(service)
}

#[derive(Deserialize)]
struct SignupRequest {
    email: String,
    password: String,
    username: String,
}

#[derive(Serialize)]
struct EmailResponse {
    email: String,
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReissueRequest {
    access_token: String,
    refresh_token: String,
}

async fn signup(
    State(service): State<AuthService>,
    Json(payload): Json<SignupRequest>,
) -> Result<Json<EmailResponse>, AuthError> {
    let email = service
        .signup(Signup {
            email: payload.email,
            password: payload.password,
            username: payload.username,
        })
        .await?;
    Ok(Json(EmailResponse { email }))
}

async fn login(
    State(service): State<AuthService>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<TokenPair>, AuthError> {
    let pair = service.login(payload.email.trim(), &payload.password).await?;
    Ok(Json(pair))
}

async fn reissue(
    State(service): State<AuthService>,
    Json(payload): Json<ReissueRequest>,
) -> Result<Json<TokenPair>, AuthError> {
    let pair = service
        .reissue(payload.access_token.trim(), payload.refresh_token.trim())
        .await?;
    Ok(Json(pair))
}
