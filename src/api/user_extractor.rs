use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use std::convert::Infallible;

use crate::model::UserContext;

/// Axum extractor for UserContext from request headers
///
/// This extractor looks for user information in request headers:
/// - X-User-Id: user identifier, marks the caller as authenticated
/// - X-User-Email: Optional user email
/// - X-User-Name: Optional user display name
///
/// Without an X-User-Id header the caller is anonymous; the host delegate
/// decides what anonymous callers may do.
#[async_trait]
impl<S> FromRequestParts<S> for UserContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(user_from_headers(&parts.headers))
    }
}

pub fn user_from_headers(headers: &HeaderMap) -> UserContext {
    match extract_header_value(headers, "x-user-id") {
        Some(user_id) => UserContext::with_details(
            user_id,
            extract_header_value(headers, "x-user-email"),
            extract_header_value(headers, "x-user-name"),
        ),
        None => UserContext::anonymous(),
    }
}

/// Extract header value as string
fn extract_header_value(headers: &HeaderMap, header_name: &str) -> Option<String> {
    headers
        .get(header_name)
        .and_then(|value| value.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
