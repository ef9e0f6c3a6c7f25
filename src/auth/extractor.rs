//! Axum extractor for the verified caller.

use crate::{errors::GatewayError, models::identity::Identity, state::AppState};
use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};

/// The verified identity of the caller.
///
/// Handlers that take this argument never run for unauthenticated requests:
/// extraction fails with the verifier's error before the handler (and so
/// before any store access).
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub Identity);

/// Token from the configured header, else from `Authorization: Bearer`.
fn raw_token<'a>(headers: &'a HeaderMap, token_header: &header::HeaderName) -> Option<&'a str> {
    if let Some(value) = headers.get(token_header) {
        return value.to_str().ok();
    }
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = GatewayError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = raw_token(&parts.headers, &state.token_header);
        let identity = state.verifier.verify(token).await?;
        tracing::debug!(sub = %identity, "authenticated request");
        Ok(AuthenticatedUser(identity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn prefers_configured_header_over_bearer() {
        let name = header::HeaderName::from_static("x-amzn-oidc-data");
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer fallback"));
        assert_eq!(raw_token(&headers, &name), Some("fallback"));

        headers.insert(name.clone(), HeaderValue::from_static("primary"));
        assert_eq!(raw_token(&headers, &name), Some("primary"));
    }

    #[test]
    fn missing_headers_yield_no_token() {
        let name = header::HeaderName::from_static("x-amzn-oidc-data");
        let mut headers = HeaderMap::new();
        assert_eq!(raw_token(&headers, &name), None);
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(raw_token(&headers, &name), None);
    }
}
