pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod handlers;
pub mod observability;
pub mod server;

pub use config::{AppConfig, BootstrapConfig, ServerConfig};
pub use observability::init_tracing;
pub use server::{OctoauthServer, ServerBuilder, build_app, build_router, build_state};
