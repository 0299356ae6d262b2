use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap, StatusCode},
    Json,
};

use crate::api::handlers::{error_response, ErrorResponse};
use crate::error::ProdhubError;
use crate::model::UserContext;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Axum extractor for UserContext from request headers
///
/// The authentication layer in front of this service validates the caller
/// and forwards their ID in `X-User-Id`. Requests without it are rejected.
#[async_trait]
impl<S> FromRequestParts<S> for UserContext
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match extract_header_value(&parts.headers, USER_ID_HEADER) {
            Some(user_id) => Ok(UserContext::new(user_id)),
            None => Err(error_response(ProdhubError::Unauthenticated)),
        }
    }
}

/// Extract header value as string; blank values count as absent
fn extract_header_value(headers: &HeaderMap, header_name: &str) -> Option<String> {
    headers
        .get(header_name)
        .and_then(|value| value.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
