//! Authorization endpoint handlers.
//!
//! ```text
//! GET /oauth/authorize?response_type=code&client_id=...&state=...
//!     ├─► invalid client or redirect_uri → error body, no redirect
//!     ├─► other invalid parameter        → redirect with error
//!     └─► valid                          → consent summary (JSON)
//!
//! POST /oauth/authorize (form: same parameters + username, password, approve)
//!     ├─► not approved         → redirect with error=access_denied
//!     ├─► bad owner credentials → 403
//!     └─► approved             → redirect with code (query) or token (fragment)
//! ```

use axum::{
    Form, Json,
    extract::{
        Query, State,
        rejection::{FormRejection, QueryRejection},
    },
    response::{IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::OAuthState;
use crate::error::AuthError;
use crate::grant::{
    AuthorizationRequestDetails, AuthorizeRejection, AuthorizeRequest, ResponseType,
};

/// What the resource owner is asked to approve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentSummary {
    pub client_id: String,
    pub client_name: String,
    pub response_type: ResponseType,
    pub redirect_uri: String,
    pub scopes: Vec<ScopeSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeSummary {
    pub id: String,
    pub description: String,
}

/// Consent form submission.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorizeForm {
    #[serde(flatten)]
    pub request: AuthorizeRequest,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// "true", "yes", "on" or "1" approves; anything else denies.
    #[serde(default)]
    pub approve: Option<String>,
}

impl AuthorizeForm {
    #[must_use]
    pub fn is_approved(&self) -> bool {
        matches!(
            self.approve.as_deref(),
            Some("true" | "yes" | "on" | "1")
        )
    }
}

/// `GET /oauth/authorize`: validates the request and describes it for consent.
pub async fn authorize_get(
    State(state): State<OAuthState>,
    query: Result<Query<AuthorizeRequest>, QueryRejection>,
) -> Response {
    let request = match query {
        Ok(Query(request)) => request,
        Err(rejection) => {
            warn!(error = %rejection, "Malformed authorization request");
            return AuthError::invalid_request(rejection.body_text()).into_response();
        }
    };
    let details = match state.server.check_authorize_params(&request).await {
        Ok(details) => details,
        Err(rejection) => return rejection_response(rejection),
    };

    let mut scopes = Vec::with_capacity(details.scopes.len());
    match state.server.scopes().describe(&details.scopes).await {
        Ok(described) => scopes.extend(described.into_iter().map(|scope| ScopeSummary {
            id: scope.id,
            description: scope.description,
        })),
        Err(e) => return redirect_error(&details, &e),
    }

    Json(ConsentSummary {
        client_id: details.client.client_id.clone(),
        client_name: details.client.name.clone(),
        response_type: details.response_type,
        redirect_uri: details.redirect.uri.clone(),
        scopes,
        state: details.state.clone(),
    })
    .into_response()
}

/// `POST /oauth/authorize`: approves or denies the request.
pub async fn authorize_post(
    State(state): State<OAuthState>,
    form: Result<Form<AuthorizeForm>, FormRejection>,
) -> Response {
    let form = match form {
        Ok(Form(form)) => form,
        Err(rejection) => {
            warn!(error = %rejection, "Malformed consent submission");
            return AuthError::invalid_request(rejection.body_text()).into_response();
        }
    };
    let details = match state.server.check_authorize_params(&form.request).await {
        Ok(details) => details,
        Err(rejection) => return rejection_response(rejection),
    };

    if !form.is_approved() {
        info!(client_id = %details.client.client_id, "Authorization denied by resource owner");
        return match state.server.deny(&details) {
            Ok(url) => Redirect::to(url.as_str()).into_response(),
            Err(e) => e.into_response(),
        };
    }

    let (Some(username), Some(password)) = (form.username.as_deref(), form.password.as_deref())
    else {
        return AuthError::invalid_request("username and password are required").into_response();
    };
    let owner_id = match state.server.authenticate_owner(username, password).await {
        Ok(owner_id) => owner_id,
        Err(e) => return e.into_response(),
    };

    match state.server.authorize(&details, &owner_id).await {
        Ok(url) => {
            info!(
                client_id = %details.client.client_id,
                response_type = ?details.response_type,
                "Authorization granted"
            );
            Redirect::to(url.as_str()).into_response()
        }
        Err(e) => redirect_error(&details, &e),
    }
}

fn rejection_response(rejection: AuthorizeRejection) -> Response {
    warn!(
        error = %rejection.error,
        redirect = rejection.redirect_to.is_some(),
        "Authorization request rejected"
    );
    match rejection.redirect_to {
        Some(url) => Redirect::to(url.as_str()).into_response(),
        None => rejection.error.into_response(),
    }
}

fn redirect_error(details: &AuthorizationRequestDetails, error: &AuthError) -> Response {
    match details.error_redirect(error) {
        Ok(url) => Redirect::to(url.as_str()).into_response(),
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        Router,
        body::{Body, to_bytes},
        http::{Request, StatusCode, header},
        routing::get,
    };
    use tower::ServiceExt;
    use url::Url;

    use super::*;
    use crate::config::{AuthorizationCodeGrantConfig, OAuthServerConfig};
    use crate::grant::StaticCredentialVerifier;
    use crate::middleware::ErrorBody;
    use crate::secret::hash_secret;
    use crate::server::AuthorizationServer;
    use crate::storage::{ClientStorage, InMemoryStorage, ScopeStorage};
    use crate::types::{Client, Scope};

    const CALLBACK: &str = "https://app.example.com/cb";

    async fn router() -> Router {
        let storage = Arc::new(InMemoryStorage::new());
        ClientStorage::create(
            storage.as_ref(),
            &Client::new("web", "Web App").with_redirect_uri(CALLBACK),
        )
        .await
        .unwrap();
        ScopeStorage::create(storage.as_ref(), &Scope::new("read", "Read your data"))
            .await
            .unwrap();

        let mut config = OAuthServerConfig::default();
        config.grants.authorization_code = Some(AuthorizationCodeGrantConfig::default());
        let verifier = StaticCredentialVerifier::new().with_user(
            "alice",
            "user-1",
            hash_secret("pw").unwrap(),
        );
        let server = AuthorizationServer::builder(config)
            .in_memory(storage)
            .credential_verifier(Arc::new(verifier))
            .build()
            .unwrap();

        Router::new()
            .route("/oauth/authorize", get(authorize_get).post(authorize_post))
            .with_state(OAuthState::new(Arc::new(server)))
    }

    fn location(response: &Response) -> Url {
        let value = response.headers().get(header::LOCATION).unwrap();
        Url::parse(value.to_str().unwrap()).unwrap()
    }

    fn post(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/oauth/authorize")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_consent_summary() {
        let request = Request::builder()
            .uri("/oauth/authorize?response_type=code&client_id=web&scope=read&state=s1")
            .body(Body::empty())
            .unwrap();
        let response = router().await.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let summary: ConsentSummary = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(summary.client_name, "Web App");
        assert_eq!(summary.redirect_uri, CALLBACK);
        assert_eq!(summary.scopes[0].description, "Read your data");
    }

    #[tokio::test]
    async fn test_unknown_client_is_not_redirected() {
        let request = Request::builder()
            .uri("/oauth/authorize?response_type=code&client_id=ghost")
            .body(Body::empty())
            .unwrap();
        let response = router().await.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().get(header::LOCATION).is_none());
    }

    #[tokio::test]
    async fn test_duplicate_query_parameter_is_invalid_request() {
        let request = Request::builder()
            .uri("/oauth/authorize?response_type=code&client_id=web&client_id=other")
            .body(Body::empty())
            .unwrap();
        let response = router().await.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.error, "invalid_request");
    }

    #[tokio::test]
    async fn test_consent_with_wrong_content_type_is_invalid_request() {
        let request = Request::builder()
            .method("POST")
            .uri("/oauth/authorize")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"client_id":"web"}"#))
            .unwrap();
        let response = router().await.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.error, "invalid_request");
    }

    #[tokio::test]
    async fn test_approve_redirects_with_code() {
        let response = router()
            .await
            .oneshot(post(
                "response_type=code&client_id=web&state=s1&username=alice&password=pw&approve=yes",
            ))
            .await
            .unwrap();
        assert!(response.status().is_redirection());

        let url = location(&response);
        let params: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(params.iter().any(|(k, _)| k == "code"));
        assert!(params.contains(&("state".to_string(), "s1".to_string())));
    }

    #[tokio::test]
    async fn test_deny_redirects_with_access_denied() {
        let response = router()
            .await
            .oneshot(post("response_type=code&client_id=web&approve=no"))
            .await
            .unwrap();
        let url = location(&response);
        assert!(url.query().unwrap().contains("error=access_denied"));
    }

    #[tokio::test]
    async fn test_wrong_password_forbidden() {
        let response = router()
            .await
            .oneshot(post(
                "response_type=code&client_id=web&username=alice&password=bad&approve=yes",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
