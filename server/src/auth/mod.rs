//! Session credential checks shared by the WebSocket handshake and the HTTP API.

pub mod jwt;
pub mod middleware;
pub mod users;

use axum::{
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use jsonwebtoken::errors::ErrorKind;
use thiserror::Error;

use crate::db::models::User;
use crate::db::DbPool;

/// Name of the cookie carrying the session credential.
pub const SESSION_COOKIE: &str = "jwt";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("You are not logged in")]
    MissingCredential,

    #[error("Invalid token")]
    InvalidCredential,

    #[error("Token expired")]
    Expired,

    #[error("The user belonging to this token no longer exists")]
    UserNotFound,

    #[error("Password was changed recently, please log in again")]
    PasswordChanged,

    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl From<rusqlite::Error> for AuthError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

impl From<tokio::task::JoinError> for AuthError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Persistence(format!("blocking task failed: {}", err))
    }
}

impl<T> From<std::sync::PoisonError<T>> for AuthError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::Persistence(format!("DB lock error: {}", err))
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Persistence(detail) => {
                tracing::error!(error = %detail, "Authentication lookup failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            other => (StatusCode::UNAUTHORIZED, other.to_string()),
        };
        (status, Json(serde_json::json!({ "message": message }))).into_response()
    }
}

/// Pull the session credential out of request headers. The `jwt` cookie wins over an
/// `Authorization: Bearer` header.
pub fn credential_from_headers(headers: &HeaderMap) -> Option<String> {
    let from_cookie = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim_matches('"').to_string())
        .filter(|value| !value.is_empty());

    from_cookie.or_else(|| {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
    })
}

/// Resolve a credential to a live user: valid signature, not expired, user still exists,
/// and no password change after the credential was issued.
pub async fn authenticate(db: &DbPool, secret: &[u8], token: &str) -> Result<User, AuthError> {
    let claims = jwt::validate_access_token(secret, token).map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => AuthError::Expired,
        _ => AuthError::InvalidCredential,
    })?;

    let db = db.clone();
    let user_id = claims.sub.clone();
    let user = tokio::task::spawn_blocking(move || -> Result<Option<User>, AuthError> {
        let conn = db.lock()?;
        Ok(users::find_user(&conn, &user_id)?)
    })
    .await??
    .ok_or(AuthError::UserNotFound)?;

    if user.changed_password_after(claims.iat) {
        return Err(AuthError::PasswordChanged);
    }

    Ok(user)
}
