//! OAuth 2.0 token endpoint handler.
//!
//! ```text
//! POST /oauth/token
//! Content-Type: application/x-www-form-urlencoded
//! Authorization: Basic <base64(client_id:client_secret)>
//!
//! grant_type=client_credentials&scope=read
//! ```
//!
//! Clients authenticate with HTTP Basic, with `client_id`/`client_secret`
//! body parameters, or (public clients) with `client_id` alone.

use axum::{
    Form, Json,
    extract::{State, rejection::FormRejection},
    http::{HeaderMap, HeaderValue, header},
    response::{IntoResponse, Response},
};
use base64::Engine;
use tracing::{debug, info, warn};

use super::OAuthState;
use crate::error::AuthError;
use crate::grant::{ClientCredentials, TokenRequest};

/// Token endpoint handler.
pub async fn token_handler(
    State(state): State<OAuthState>,
    headers: HeaderMap,
    form: Result<Form<TokenRequest>, FormRejection>,
) -> Response {
    let request = match form {
        Ok(Form(request)) => request,
        Err(rejection) => {
            warn!(error = %rejection, "Malformed token request");
            return no_store(AuthError::invalid_request(rejection.body_text()).into_response());
        }
    };

    debug!(
        grant_type = %request.grant_type,
        client_id = ?request.client_id,
        "Processing token request"
    );

    let auth = extract_client_auth(&headers, &request);
    let used_basic = auth.is_basic();
    let result = match auth.into_credentials() {
        Ok(credentials) => {
            state
                .server
                .issue_access_token(&request, credentials)
                .await
        }
        Err(e) => Err(e),
    };

    let response = match result {
        Ok(response) => {
            info!(grant_type = %request.grant_type, "Token issued");
            Json(response).into_response()
        }
        Err(e) => {
            warn!(grant_type = %request.grant_type, error = %e, "Token request failed");
            let challenge = used_basic && matches!(e, AuthError::InvalidClient { .. });
            let mut response = e.into_response();
            if challenge {
                // RFC 6749 section 5.2
                response.headers_mut().insert(
                    header::WWW_AUTHENTICATE,
                    HeaderValue::from_static("Basic realm=\"octoauth\""),
                );
            }
            response
        }
    };
    no_store(response)
}

/// Client authentication presented with a token request.
#[derive(Debug, PartialEq, Eq)]
enum ClientAuth {
    /// HTTP Basic authentication.
    Basic { client_id: String, client_secret: String },
    /// Credentials in the request body.
    Body { client_id: String, client_secret: String },
    /// Public client (no secret).
    Public { client_id: String },
    /// A Basic header that could not be decoded.
    Malformed,
    /// No client identification.
    None,
}

impl ClientAuth {
    /// The client tried HTTP Basic authentication.
    fn is_basic(&self) -> bool {
        matches!(self, Self::Basic { .. } | Self::Malformed)
    }

    fn into_credentials(self) -> Result<ClientCredentials, AuthError> {
        match self {
            Self::Basic {
                client_id,
                client_secret,
            }
            | Self::Body {
                client_id,
                client_secret,
            } => Ok(ClientCredentials::new(client_id, Some(client_secret.as_str()))),
            Self::Public { client_id } => Ok(ClientCredentials::new(client_id, None)),
            Self::Malformed => Err(AuthError::invalid_client(
                "Malformed Basic authorization header",
            )),
            Self::None => Err(AuthError::invalid_client("Client authentication required")),
        }
    }
}

fn extract_client_auth(headers: &HeaderMap, request: &TokenRequest) -> ClientAuth {
    if let Some(basic) = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Basic "))
    {
        return decode_basic(basic).map_or(ClientAuth::Malformed, |(client_id, client_secret)| {
            ClientAuth::Basic {
                client_id,
                client_secret,
            }
        });
    }

    match (request.client_id.as_ref(), request.client_secret.as_ref()) {
        (Some(client_id), Some(client_secret)) => ClientAuth::Body {
            client_id: client_id.clone(),
            client_secret: client_secret.clone(),
        },
        (Some(client_id), None) => ClientAuth::Public {
            client_id: client_id.clone(),
        },
        (None, _) => ClientAuth::None,
    }
}

fn decode_basic(encoded: &str) -> Option<(String, String)> {
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (client_id, client_secret) = decoded.split_once(':')?;
    Some((form_decode(client_id), form_decode(client_secret)))
}

/// Basic credentials are form-urlencoded before base64 (RFC 6749 section 2.3.1).
fn form_decode(component: &str) -> String {
    let escaped = component.replace('&', "%26").replace('=', "%3D");
    url::form_urlencoded::parse(escaped.as_bytes())
        .next()
        .map(|(decoded, _)| decoded.into_owned())
        .unwrap_or_default()
}

/// Token responses must not be cached (RFC 6749 section 5.1).
fn no_store(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    response
}
