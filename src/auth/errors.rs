//! Authentication error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

/// JSON body shared by every authentication failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}

/// Business errors raised by login, reissue and the member endpoints.
///
/// Each variant maps to a stable code and HTTP status; the response body is
/// the same shape the request authenticator uses for its own rejections.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("token is empty")]
    MissingToken,
    #[error("token has expired")]
    ExpiredToken,
    #[error("token is malformed or its signature is invalid")]
    MalformedToken,
    #[error("token carries no authority")]
    MissingAuthority,
    #[error("email or password is incorrect")]
    BadCredentials,
    #[error("refresh token does not match the stored value")]
    RefreshTokenMismatch,
    #[error("no record for subject")]
    SubjectNotFound,
    #[error("insufficient authority")]
    InsufficientAuthority,
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("member already exists")]
    MemberExists,
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn internal(context: &str, e: impl std::fmt::Display) -> Self {
        tracing::error!("{}: {}", context, e);
        Self::Internal(context.to_string())
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingToken => "EMPTY_TOKEN",
            Self::ExpiredToken => "EXPIRED_TOKEN",
            Self::MalformedToken => "BAD_TOKEN",
            Self::MissingAuthority => "NOT_FOUND_AUTHORITY",
            Self::BadCredentials => "BAD_CREDENTIALS",
            Self::RefreshTokenMismatch => "REFRESH_TOKEN_MISMATCH",
            Self::SubjectNotFound => "NOT_FOUND_USER",
            Self::InsufficientAuthority => "ACCESS_DENIED",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::MemberExists => "DUPLICATE_MEMBER",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingToken
            | Self::ExpiredToken
            | Self::MalformedToken
            | Self::MissingAuthority
            | Self::BadCredentials
            | Self::RefreshTokenMismatch
            | Self::InsufficientAuthority => StatusCode::FORBIDDEN,
            Self::SubjectNotFound => StatusCode::NOT_FOUND,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::MemberExists => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::MissingToken => "Token is empty".into(),
            Self::ExpiredToken => "Token has expired".into(),
            Self::MalformedToken => "Token is invalid".into(),
            Self::MissingAuthority => "Member has no authority".into(),
            Self::BadCredentials => "Email or password is incorrect".into(),
            Self::RefreshTokenMismatch => "Refresh token does not match".into(),
            Self::SubjectNotFound => "Member not found".into(),
            Self::InsufficientAuthority => "Access denied".into(),
            Self::InvalidRequest(msg) => msg.clone(),
            Self::MemberExists => "Member already exists".into(),
            // Internal details stay in the logs.
            Self::Internal(_) => "Internal server error".into(),
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody::new(self.code(), self.message())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.body())).into_response()
    }
}
