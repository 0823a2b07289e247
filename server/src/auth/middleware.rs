use axum::{extract::FromRequestParts, http::request::Parts};
use serde::{Deserialize, Serialize};

use crate::auth::{self, AuthError};
use crate::db::models::User;
use crate::state::AppState;

/// JWT claims carried in the session credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
}

/// The authenticated caller of an HTTP handler.
///
/// Reads the credential from the `jwt` cookie or an `Authorization: Bearer` header and
/// applies the same checks as the WebSocket handshake.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = auth::credential_from_headers(&parts.headers).ok_or(AuthError::MissingCredential)?;
        let user = auth::authenticate(&state.db, &state.jwt_secret, &token).await?;
        Ok(AuthUser(user))
    }
}
