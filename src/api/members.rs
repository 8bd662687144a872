//! Member endpoints. All routes sit behind the authenticator.
//!
//! - GET `/` - Email of the authenticated member
//! - GET `/admintest` - Admin-only check
//! - GET `/{email}` - Look up a member by email

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use serde::Serialize;

use super::error::ResultExt;
use crate::auth::{AdminOnly, AuthError, Authenticated};
use crate::db::Database;

pub fn router(db: Database) -> Router {
    Router::new()
        .route("/", get(current_member))
        .route("/admintest", get(admin_test))
        .route("/{email}", get(find_member))
        .with_state(db)
}

#[derive(Serialize)]
struct MemberResponse {
    email: String,
}

async fn current_member(Authenticated(principal): Authenticated) -> Json<MemberResponse> {
    Json(MemberResponse {
        email: principal.subject,
    })
}

async fn admin_test(AdminOnly(_principal): AdminOnly) -> &'static str {
    "ADMIN OK!"
}

async fn find_member(
    _auth: Authenticated,
    State(db): State<Database>,
    Path(email): Path<String>,
) -> Result<Json<MemberResponse>, AuthError> {
    let member = db
        .members()
        .get_by_email(&email)
        .await
        .db_err("Failed to load member")?
        .ok_or(AuthError::SubjectNotFound)?;

    Ok(Json(MemberResponse {
        email: member.email,
    }))
}
