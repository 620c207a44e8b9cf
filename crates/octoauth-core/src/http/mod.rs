//! HTTP handlers for the OAuth 2.0 endpoints.
//!
//! # Available Handlers
//!
//! - [`token_handler`] - Token endpoint (`POST /oauth/token`)
//! - [`authorize_get`] / [`authorize_post`] - Authorization endpoint
//! - [`sweep_handler`] - On-demand expiry sweep

use std::sync::Arc;

use crate::server::AuthorizationServer;
use crate::sweeper::ExpirySweeper;

pub mod authorize;
pub mod maintenance;
pub mod token;

pub use authorize::{AuthorizeForm, ConsentSummary, authorize_get, authorize_post};
pub use maintenance::sweep_handler;
pub use token::token_handler;

/// Shared state of the OAuth handlers.
#[derive(Clone)]
pub struct OAuthState {
    pub server: Arc<AuthorizationServer>,
    pub sweeper: Arc<ExpirySweeper>,
}

impl OAuthState {
    #[must_use]
    pub fn new(server: Arc<AuthorizationServer>) -> Self {
        let sweeper = Arc::new(server.expiry_sweeper());
        Self { server, sweeper }
    }
}
