use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    BoxError, Router,
    error_handling::HandleErrorLayer,
    http::StatusCode,
    middleware,
    routing::{get, post},
};
use octoauth_core::http::{authorize_get, authorize_post, sweep_handler, token_handler};
use octoauth_core::{AuthorizationServer, InMemoryStorage, OAuthFilter, OAuthState, oauth_filter};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::{bootstrap, config::AppConfig, handlers};

pub struct OctoauthServer {
    addr: SocketAddr,
    app: Router,
    state: OAuthState,
    sweeper_enabled: bool,
}

/// Seeds the in-memory store from configuration and assembles the
/// authorization server.
pub async fn build_state(cfg: &AppConfig) -> anyhow::Result<OAuthState> {
    let storage = Arc::new(InMemoryStorage::new());
    bootstrap::seed_storage(&storage, &cfg.bootstrap).await?;

    let mut builder = AuthorizationServer::builder(cfg.oauth.clone()).in_memory(storage);
    if !cfg.bootstrap.users.is_empty() {
        let verifier = bootstrap::credential_verifier(&cfg.bootstrap)?;
        tracing::info!(users = verifier.len(), "Credential verifier configured");
        builder = builder.credential_verifier(Arc::new(verifier));
    }
    let server = builder.build().context("authorization server assembly failed")?;

    Ok(OAuthState::new(Arc::new(server)))
}

pub fn build_router(cfg: &AppConfig, state: OAuthState) -> Router {
    let body_limit = cfg.server.body_limit_bytes;
    let timeout = Duration::from_millis(cfg.server.request_timeout_ms);
    let validator = state.server.token_validator();

    // Protected resources: any valid token
    let api = Router::new()
        .route("/api/me", get(handlers::me))
        .layer(middleware::from_fn_with_state(
            OAuthFilter::new(validator.clone()),
            oauth_filter,
        ));

    // Maintenance: tokens carrying the maintenance scope
    let maintenance = Router::new()
        .route("/oauth/maintenance/sweep", post(sweep_handler))
        .layer(middleware::from_fn_with_state(
            OAuthFilter::new(validator).with_scopes([cfg.maintenance.scope.clone()]),
            oauth_filter,
        ));

    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/oauth/token", post(token_handler))
        .route("/oauth/authorize", get(authorize_get).post(authorize_post))
        .merge(api)
        .merge(maintenance)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_timeout))
                .timeout(timeout),
        )
        .layer(TraceLayer::new_for_http())
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
}

pub async fn build_app(cfg: &AppConfig) -> anyhow::Result<Router> {
    let state = build_state(cfg).await?;
    Ok(build_router(cfg, state))
}

async fn handle_timeout(err: BoxError) -> (StatusCode, String) {
    if err.is::<tower::timeout::error::Elapsed>() {
        (StatusCode::REQUEST_TIMEOUT, "request timed out".to_string())
    } else {
        tracing::error!(error = %err, "Unhandled middleware error");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal server error".to_string(),
        )
    }
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    pub async fn build(self) -> anyhow::Result<OctoauthServer> {
        let state = build_state(&self.config).await?;
        let app = build_router(&self.config, state.clone());

        Ok(OctoauthServer {
            addr: self.addr,
            app,
            state,
            sweeper_enabled: self.config.oauth.sweeper.enabled,
        })
    }
}

impl OctoauthServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let sweeper = self.sweeper_enabled.then(|| {
            tracing::info!(
                interval_secs = self.state.sweeper.interval().as_secs(),
                "Expiry sweeper started"
            );
            self.state.sweeper.clone().spawn()
        });

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        let served = axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await;

        if let Some(handle) = sweeper {
            handle.abort();
        }
        served?;
        Ok(())
    }
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
