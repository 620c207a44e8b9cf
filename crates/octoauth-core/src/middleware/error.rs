//! Error response handling.
//!
//! `AuthError` renders as an RFC 6749 error body:
//!
//! ```json
//! { "error": "invalid_grant", "error_description": "The authorization code has expired" }
//! ```
//!
//! Bearer token failures carry a `WWW-Authenticate` challenge (RFC 6750) and
//! storage failures a `Retry-After` header. The token endpoint adds the
//! `Basic` challenge for failed client authentication itself.

use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// Seconds a client should wait before retrying after a storage failure.
pub const RETRY_AFTER_SECS: u64 = 5;

const REALM: &str = "octoauth";

/// Wire format of an OAuth error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub error_description: String,
}

impl From<&AuthError> for ErrorBody {
    fn from(error: &AuthError) -> Self {
        Self {
            error: error.oauth_error_code().to_string(),
            error_description: error.description(),
        }
    }
}

// =============================================================================
// IntoResponse Implementation
// =============================================================================

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        let body = ErrorBody::from(&self);

        if self.is_server_error() {
            tracing::error!(error = %self, category = %self.category(), "Request failed");
        } else {
            tracing::debug!(error = %self, category = %self.category(), "Request rejected");
        }

        let mut headers = HeaderMap::new();
        if self.is_token_error() {
            let challenge = www_authenticate(&body.error, &body.error_description);
            if let Ok(value) = HeaderValue::from_str(&challenge) {
                headers.insert(header::WWW_AUTHENTICATE, value);
            }
        }
        if self.is_retryable() {
            headers.insert(header::RETRY_AFTER, HeaderValue::from(RETRY_AFTER_SECS));
        }

        (status, headers, Json(body)).into_response()
    }
}

/// HTTP status for an error.
#[must_use]
pub fn status_for(error: &AuthError) -> StatusCode {
    match error {
        AuthError::InvalidClient { .. } | AuthError::InvalidAccessToken { .. } => {
            StatusCode::UNAUTHORIZED
        }
        AuthError::InsufficientScope { .. } | AuthError::AccessDenied { .. } => {
            StatusCode::FORBIDDEN
        }
        AuthError::InvalidGrant { .. }
        | AuthError::InvalidScope { .. }
        | AuthError::InvalidRequest { .. }
        | AuthError::UnsupportedResponseType { .. }
        | AuthError::UnsupportedGrantType { .. } => StatusCode::BAD_REQUEST,
        AuthError::Storage { .. } => StatusCode::SERVICE_UNAVAILABLE,
        AuthError::Configuration { .. } | AuthError::Internal { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// `Bearer realm="octoauth", error="invalid_token", error_description="..."`
fn www_authenticate(error: &str, description: &str) -> String {
    let escaped = description.replace('"', "\\\"");
    format!("Bearer realm=\"{REALM}\", error=\"{error}\", error_description=\"{escaped}\"")
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_of(response: Response) -> ErrorBody {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_invalid_token_challenge() {
        let response =
            AuthError::invalid_access_token("The access token has expired").into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let challenge = response
            .headers()
            .get(header::WWW_AUTHENTICATE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(challenge.starts_with("Bearer realm=\"octoauth\""));
        assert!(challenge.contains("error=\"invalid_token\""));

        let body = body_of(response).await;
        assert_eq!(body.error, "invalid_token");
    }

    #[tokio::test]
    async fn test_insufficient_scope_forbidden() {
        let response = AuthError::insufficient_scope("write").into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
    }

    #[tokio::test]
    async fn test_storage_error_hides_details() {
        let response = AuthError::storage("connection refused to 10.0.0.3").into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER).unwrap(),
            &RETRY_AFTER_SECS.to_string()
        );

        let body = body_of(response).await;
        assert_eq!(body.error, "temporarily_unavailable");
        assert!(!body.error_description.contains("10.0.0.3"));
    }

    #[test]
    fn test_token_endpoint_statuses() {
        assert_eq!(status_for(&AuthError::invalid_client("x")), StatusCode::UNAUTHORIZED);
        assert_eq!(status_for(&AuthError::invalid_grant("x")), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(&AuthError::unsupported_grant_type("device_code")),
            StatusCode::BAD_REQUEST
        );
    }
}
