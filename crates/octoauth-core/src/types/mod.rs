//! Domain types for clients, scopes and sessions.

pub mod client;
pub mod scope;
pub mod session;

pub use client::{Client, ClientValidationError, GrantType, UnknownGrantType};
pub use scope::Scope;
pub use session::{IssuedToken, Session, TokenKind, generate_token, hash_token};
