//! Storage traits for clients, scopes and sessions.
//!
//! Registries and grant processors only talk to these traits, so any
//! repository adapter can back them. [`InMemoryStorage`] implements all three.

pub mod client;
pub mod memory;
pub mod scope;
pub mod session;

pub use client::ClientStorage;
pub use memory::InMemoryStorage;
pub use scope::ScopeStorage;
pub use session::{Retirement, SessionStorage, TokenExchange};
