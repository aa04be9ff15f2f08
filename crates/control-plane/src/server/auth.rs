//! Caller identification.

use axum::{extract::FromRequestParts, http::request::Parts};
use node_runtime::Error;
use uuid::Uuid;

use super::error::ApiError;

/// Header carrying the calling account's id.
pub const ACCOUNT_HEADER: &str = "x-account-id";

/// The calling account, taken from the `X-Account-ID` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountId(pub Uuid);

impl<S> FromRequestParts<S> for AccountId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(ACCOUNT_HEADER)
            .and_then(|h| h.to_str().ok())
            .and_then(|v| Uuid::parse_str(v.trim()).ok())
            .map(AccountId)
            .ok_or_else(|| {
                ApiError(
                    Error::unauthorized("Missing or invalid account id")
                        .with_suggestion("Set the X-Account-ID header to your account id"),
                )
            })
    }
}
