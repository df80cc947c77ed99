use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tracing::{debug, warn};

use super::{claims::Principal, jwt::TokenProvider};
use crate::error::ApiError;

/// Resolves `Authorization: Bearer <access token>` to the calling principal.
pub struct AuthUser(pub Principal);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    TokenProvider: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let tokens = TokenProvider::from_ref(state);
        let auth_header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("Missing Authorization header".into()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .or_else(|| auth_header.strip_prefix("bearer "))
            .ok_or_else(|| ApiError::Unauthorized("Invalid Authorization header".into()))?;

        if !tokens.valid_token(token) {
            warn!("invalid or expired token");
            return Err(ApiError::Unauthorized("Invalid or expired token".into()));
        }

        let principal = tokens
            .get_authentication(token)
            .map_err(|_| ApiError::Unauthorized("Invalid or expired token".into()))?;
        debug!(user_id = principal.user_id, authorities = ?principal.authorities, "authenticated");
        Ok(AuthUser(principal))
    }
}
