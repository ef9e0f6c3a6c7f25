use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Caller-visible failure kinds.
///
/// Each variant maps to a fixed HTTP status and a stable machine-readable
/// `code`, so a client can tell "try again" apart from "fix your credentials"
/// and "you don't own this". Infrastructure detail never appears in the
/// message; it is logged where the failure happens instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("not authenticated")]
    Unauthenticated,
    #[error("token expired")]
    TokenExpired,
    #[error("invalid token")]
    TokenInvalid,
    #[error("access denied")]
    AccessDenied,
    #[error("not found")]
    NotFound,
    #[error("payload exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: usize },
    #[error("{0}")]
    BadRequest(String),
    #[error("storage temporarily unavailable")]
    StoreUnavailable,
    #[error("download link expired")]
    LinkExpired,
    #[error("download link invalid")]
    LinkInvalid,
}

pub type GatewayResult<T> = Result<T, GatewayError>;

impl GatewayError {
    /// Shortcut for a 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated | Self::TokenExpired | Self::TokenInvalid => {
                StatusCode::UNAUTHORIZED
            }
            Self::AccessDenied | Self::LinkExpired | Self::LinkInvalid => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Stable identifier clients can match on.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::TokenExpired => "token_expired",
            Self::TokenInvalid => "token_invalid",
            Self::AccessDenied => "access_denied",
            Self::NotFound => "not_found",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::BadRequest(_) => "bad_request",
            Self::StoreUnavailable => "store_unavailable",
            Self::LinkExpired => "link_expired",
            Self::LinkInvalid => "link_invalid",
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "error": self.to_string(),
            "code": self.code(),
            "status": status.as_u16()
        }));

        let mut response = (status, body).into_response();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            response.headers_mut().insert(
                axum::http::header::RETRY_AFTER,
                axum::http::HeaderValue::from_static("1"),
            );
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_are_distinct_per_failure_class() {
        assert_eq!(GatewayError::TokenExpired.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(GatewayError::AccessDenied.status(), StatusCode::FORBIDDEN);
        assert_eq!(GatewayError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            GatewayError::PayloadTooLarge { limit: 1 }.status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            GatewayError::StoreUnavailable.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_ne!(
            GatewayError::TokenExpired.code(),
            GatewayError::TokenInvalid.code()
        );
    }

    #[test]
    fn unavailable_response_is_marked_retryable() {
        let response = GatewayError::StoreUnavailable.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(response.headers().contains_key("retry-after"));
    }
}
