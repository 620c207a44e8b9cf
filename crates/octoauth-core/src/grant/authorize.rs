//! Authorization endpoint request and redirect types.
//!
//! The code flow answers with `?code=..&state=..` on the redirect URI; the
//! implicit flow answers in the fragment. Errors raised after the redirect
//! URI has been validated are sent back to the client the same way
//! (RFC 6749 section 4.1.2.1).

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::AuthError;
use crate::registry::ResolvedRedirect;
use crate::types::{Client, GrantType};

/// Authorization endpoint parameters.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuthorizeRequest {
    /// "code" or "token".
    #[serde(default)]
    pub response_type: Option<String>,

    #[serde(default)]
    pub client_id: Option<String>,

    #[serde(default)]
    pub redirect_uri: Option<String>,

    #[serde(default)]
    pub scope: Option<String>,

    /// Opaque value echoed back on the redirect.
    #[serde(default)]
    pub state: Option<String>,
}

/// Supported `response_type` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    Code,
    Token,
}

impl ResponseType {
    /// Parses a `response_type` parameter.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedResponseType` for anything but "code" and "token".
    pub fn parse(value: &str) -> Result<Self, AuthError> {
        match value {
            "code" => Ok(Self::Code),
            "token" => Ok(Self::Token),
            other => Err(AuthError::unsupported_response_type(other)),
        }
    }

    #[must_use]
    pub fn grant_type(&self) -> GrantType {
        match self {
            Self::Code => GrantType::AuthorizationCode,
            Self::Token => GrantType::Implicit,
        }
    }

    /// Implicit responses travel in the URI fragment.
    #[must_use]
    pub fn uses_fragment(&self) -> bool {
        matches!(self, Self::Token)
    }
}

/// A validated authorization request, ready to be shown for consent and
/// then approved or denied.
#[derive(Debug, Clone)]
pub struct AuthorizationRequestDetails {
    pub client: Client,
    pub response_type: ResponseType,
    pub redirect: ResolvedRedirect,
    pub scopes: BTreeSet<String>,
    pub state: Option<String>,
}

impl AuthorizationRequestDetails {
    /// Builds the redirect that carries `params` back to the client.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the stored redirect URI does not parse.
    pub fn redirect_with<'a>(
        &self,
        params: impl IntoIterator<Item = (&'a str, String)>,
    ) -> Result<Url, AuthError> {
        build_redirect(
            &self.redirect.uri,
            self.response_type.uses_fragment(),
            params,
            self.state.as_deref(),
        )
    }

    /// Builds the redirect reporting `error` to the client.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the stored redirect URI does not parse.
    pub fn error_redirect(&self, error: &AuthError) -> Result<Url, AuthError> {
        error_redirect(
            &self.redirect.uri,
            self.response_type.uses_fragment(),
            error,
            self.state.as_deref(),
        )
    }
}

/// Failure of an authorization request.
///
/// `redirect_to` is set once the client and redirect URI were validated, in
/// which case the error belongs on the client's redirect URI instead of
/// the user agent.
#[derive(Debug)]
pub struct AuthorizeRejection {
    pub error: AuthError,
    pub redirect_to: Option<Url>,
}

impl From<AuthError> for AuthorizeRejection {
    fn from(error: AuthError) -> Self {
        Self {
            error,
            redirect_to: None,
        }
    }
}

pub(crate) fn error_redirect(
    redirect_uri: &str,
    fragment: bool,
    error: &AuthError,
    state: Option<&str>,
) -> Result<Url, AuthError> {
    build_redirect(
        redirect_uri,
        fragment,
        [
            ("error", error.oauth_error_code().to_string()),
            ("error_description", error.description()),
        ],
        state,
    )
}

fn build_redirect<'a>(
    redirect_uri: &str,
    fragment: bool,
    params: impl IntoIterator<Item = (&'a str, String)>,
    state: Option<&str>,
) -> Result<Url, AuthError> {
    let mut url = Url::parse(redirect_uri)
        .map_err(|e| AuthError::internal(format!("stored redirect URI is invalid: {e}")))?;

    if fragment {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (key, value) in params {
            serializer.append_pair(key, &value);
        }
        if let Some(state) = state {
            serializer.append_pair("state", state);
        }
        let encoded = serializer.finish();
        url.set_fragment(Some(&encoded));
    } else {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in params {
            pairs.append_pair(key, &value);
        }
        if let Some(state) = state {
            pairs.append_pair("state", state);
        }
    }

    Ok(url)
}
