//! HTTP middleware for protected resources.
//!
//! - [`filter`]: bearer token validation and required scopes
//! - [`error`]: OAuth error responses for `AuthError`

pub mod error;
pub mod filter;

pub use error::{ErrorBody, RETRY_AFTER_SECS, status_for};
pub use filter::{OAuthFilter, oauth_filter};
