//! Client and scope registries.
//!
//! Both registries are read-only views over their storage traits plus the
//! restriction flags from [`OAuthServerConfig`](crate::config::OAuthServerConfig).
//! They have no side effects.

pub mod client;
pub mod scope;

pub use client::{ClientRegistry, ResolvedRedirect};
pub use scope::{ScopeRegistry, ScopeSettings, split_scopes};
