use crate::models::types::UserId;
use crate::net::http::ApiError;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

/// Header carrying the verified user id. Set by the auth layer in front of
/// this service; requests reaching us directly must not be able to forge it.
pub const AUTH_USER_HEADER: &str = "x-auth-user-id";

/// The authenticated caller. Rejects with 401 when the header is missing or
/// does not hold a UUID.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub UserId);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(AUTH_USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<UserId>().ok())
            .map(AuthUser)
            .ok_or(ApiError::Unauthorized)
    }
}
