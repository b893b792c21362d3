//! Per-browser session identification
//!
//! The page generates a UUID once and sends it as `x-session-id` on every
//! request. Requests without the header share the default session.

use std::fmt;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::error::ApiError;

pub const SESSION_HEADER: &str = "x-session-id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionId {
    Default,
    Browser(Uuid),
}

impl SessionId {
    pub fn parse(raw: Option<&str>) -> Result<Self, ApiError> {
        match raw.map(str::trim).filter(|s| !s.is_empty()) {
            None => Ok(SessionId::Default),
            Some(value) => Uuid::parse_str(value)
                .map(SessionId::Browser)
                .map_err(|_| ApiError::BadRequest(format!("invalid {}: {}", SESSION_HEADER, value))),
        }
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionId::Default => write!(f, "default"),
            SessionId::Browser(id) => write!(f, "{}", id),
        }
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for SessionId {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(SESSION_HEADER)
            .map(|v| v.to_str().map_err(|_| ApiError::BadRequest(format!("invalid {}", SESSION_HEADER))))
            .transpose()?;
        SessionId::parse(raw)
    }
}
