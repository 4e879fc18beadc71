//! Caller identity as propagated by the gateway.
//!
//! The gateway has already validated the caller; these headers are trusted and
//! treated as opaque keys.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderName;

use crate::error::AppError;

pub static USER_ID_HEADER: HeaderName = HeaderName::from_static("x-user-id");
pub static USER_ROLE_HEADER: HeaderName = HeaderName::from_static("x-user-role");

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerId(pub String);

impl<S> FromRequestParts<S> for CallerId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(&USER_ID_HEADER)
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| CallerId(id.to_string()))
            .ok_or_else(|| AppError::AuthenticationError("Unauthorized".to_string()))
    }
}

/// Role header; absent means an ordinary customer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerRole(pub Option<String>);

impl CallerRole {
    pub fn is_admin(&self) -> bool {
        self.0.as_deref() == Some("admin")
    }
}

impl<S> FromRequestParts<S> for CallerRole
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(CallerRole(
            parts
                .headers
                .get(&USER_ROLE_HEADER)
                .and_then(|h| h.to_str().ok())
                .map(str::to_string),
        ))
    }
}
