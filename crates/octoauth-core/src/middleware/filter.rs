//! Bearer token filter for protected routes.
//!
//! Wrap a router with [`oauth_filter`] via `from_fn_with_state`. A request
//! passes when its token validates and carries every scope the filter
//! requires; the resulting [`AccessGrant`] is placed in the request
//! extensions.
//!
//! ```ignore
//! let filter = OAuthFilter::new(server.token_validator()).with_scopes(["read"]);
//! let api = Router::new()
//!     .route("/api/me", get(me))
//!     .layer(middleware::from_fn_with_state(filter, oauth_filter));
//! ```

use axum::{
    body::{Body, to_bytes},
    extract::{Request, State},
    http::{Method, header},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::AuthError;
use crate::validator::{AccessGrant, BearerRequest, TokenValidator};

const ACCESS_TOKEN_PARAM: &str = "access_token";

/// Largest form body buffered while looking for an `access_token` parameter.
const MAX_FORM_BODY: usize = 64 * 1024;

#[derive(Clone)]
pub struct OAuthFilter {
    validator: TokenValidator,
    scopes: Vec<String>,
}

impl OAuthFilter {
    #[must_use]
    pub fn new(validator: TokenValidator) -> Self {
        Self {
            validator,
            scopes: Vec::new(),
        }
    }

    /// Scopes every request must carry.
    #[must_use]
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_http_headers_only(mut self, http_headers_only: bool) -> Self {
        self.validator = self.validator.with_http_headers_only(http_headers_only);
        self
    }

    #[must_use]
    pub fn is_http_headers_only(&self) -> bool {
        self.validator.is_http_headers_only()
    }

    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Validates the token and checks the required scopes.
    pub async fn authorize(&self, bearer: &BearerRequest) -> Result<AccessGrant, AuthError> {
        let grant = self.validator.validate(bearer).await?;
        if let Some(missing) = self.scopes.iter().find(|scope| !grant.has_scope(scope)) {
            return Err(AuthError::insufficient_scope(missing.clone()));
        }
        Ok(grant)
    }
}

/// Middleware function guarding a route with an [`OAuthFilter`].
pub async fn oauth_filter(
    State(filter): State<OAuthFilter>,
    request: Request,
    next: Next,
) -> Response {
    let headers_only = filter.is_http_headers_only();
    let (request, bearer) = match bearer_from_request(request, headers_only).await {
        Ok(extracted) => extracted,
        Err(e) => return e.into_response(),
    };

    match filter.authorize(&bearer).await {
        Ok(grant) => {
            tracing::debug!(
                client_id = %grant.client_id,
                session_id = %grant.session_id,
                "Access token accepted"
            );
            let mut request = request;
            request.extensions_mut().insert(grant);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Collects the token candidates from headers, query, and a form body.
///
/// A form body is buffered and put back so the handler can still read it.
async fn bearer_from_request(
    request: Request,
    http_headers_only: bool,
) -> Result<(Request, BearerRequest), AuthError> {
    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string);

    if http_headers_only || authorization.is_some() {
        let bearer = BearerRequest {
            authorization,
            access_token_param: None,
        };
        return Ok((request, bearer));
    }

    let mut access_token_param = request.uri().query().and_then(find_access_token);

    let (request, form_token) = if access_token_param.is_none() && is_form_post(&request) {
        let (parts, body) = request.into_parts();
        let bytes = to_bytes(body, MAX_FORM_BODY)
            .await
            .map_err(|_| AuthError::invalid_request("Request body is too large"))?;
        let token = std::str::from_utf8(&bytes).ok().and_then(find_access_token);
        (Request::from_parts(parts, Body::from(bytes)), token)
    } else {
        (request, None)
    };
    if access_token_param.is_none() {
        access_token_param = form_token;
    }

    Ok((
        request,
        BearerRequest {
            authorization: None,
            access_token_param,
        },
    ))
}

fn is_form_post(request: &Request) -> bool {
    request.method() == Method::POST
        && request
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"))
}

fn find_access_token(encoded: &str) -> Option<String> {
    url::form_urlencoded::parse(encoded.as_bytes())
        .find(|(key, _)| key == ACCESS_TOKEN_PARAM)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::{Extension, Router, http::StatusCode, middleware, routing::get};
    use time::OffsetDateTime;
    use tower::ServiceExt;

    use super::*;
    use crate::storage::{InMemoryStorage, SessionStorage};
    use crate::types::{IssuedToken, Session};

    async fn setup(filter_scopes: &[&str]) -> (Router, String) {
        let storage = Arc::new(InMemoryStorage::new());
        let now = OffsetDateTime::now_utc();
        let (token, access) =
            IssuedToken::mint(Duration::from_secs(600), BTreeSet::from(["read".to_string()]), now);
        let session = Session::new("app", Some("alice".into()), BTreeSet::new(), now)
            .with_access_token(access);
        SessionStorage::create(storage.as_ref(), &session).await.unwrap();

        let filter = OAuthFilter::new(TokenValidator::new(storage))
            .with_scopes(filter_scopes.iter().copied());
        let router = Router::new()
            .route(
                "/protected",
                get(|Extension(grant): Extension<AccessGrant>| async move { grant.client_id })
                    .post(|body: String| async move { body }),
            )
            .layer(middleware::from_fn_with_state(filter, oauth_filter));
        (router, token)
    }

    fn get_request(uri: &str, authorization: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri(uri);
        if let Some(value) = authorization {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_header_token_passes() {
        let (router, token) = setup(&["read"]).await;
        let response = router
            .oneshot(get_request("/protected", Some(&format!("Bearer {token}"))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"app");
    }

    #[tokio::test]
    async fn test_missing_token_unauthorized() {
        let (router, _) = setup(&[]).await;
        let response = router.oneshot(get_request("/protected", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
    }

    #[tokio::test]
    async fn test_missing_scope_forbidden() {
        let (router, token) = setup(&["read", "write"]).await;
        let response = router
            .oneshot(get_request("/protected", Some(&format!("Bearer {token}"))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_query_parameter_token() {
        let (router, token) = setup(&["read"]).await;
        let response = router
            .oneshot(get_request(&format!("/protected?access_token={token}"), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_form_body_token_preserved_for_handler() {
        let (router, token) = setup(&[]).await;
        let form = format!("access_token={token}&note=hello");
        let request = axum::http::Request::builder()
            .method(Method::POST)
            .uri("/protected")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(form.clone()))
            .unwrap();

        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], form.as_bytes());
    }
}
