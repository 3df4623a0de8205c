//! Bearer authentication
//!
//! The bearer token is the user id handed out at signup.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;

use super::ApiState;
use crate::Error;
use crate::ledger::{User, UserId};

/// Extract the token from `Authorization: Bearer <token>`
///
/// Exactly two whitespace-separated parts; the scheme is matched
/// case-insensitively.
fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get("authorization")?.to_str().ok()?;
    let mut parts = value.split_whitespace();
    let scheme = parts.next()?;
    let token = parts.next()?;
    if parts.next().is_some() || !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token)
}

/// The authenticated caller
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl FromRequestParts<Arc<ApiState>> for AuthUser {
    type Rejection = Error;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<ApiState>,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = extract_bearer(&parts.headers) else {
            tracing::debug!("no bearer token provided");
            return Err(Error::Unauthenticated);
        };

        state
            .ledger
            .get_user(&UserId::from(token))
            .map(Self)
            .map_err(|_| {
                tracing::debug!("unknown bearer token");
                Error::Unauthenticated
            })
    }
}
