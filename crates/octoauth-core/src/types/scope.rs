//! Scope registrations.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::GrantType;

/// A named permission unit that can be attached to tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    /// Identifier used in scope strings.
    pub id: String,

    #[serde(default)]
    pub description: String,

    /// Grants this scope may be requested under when scope-to-grant
    /// restriction is enabled.
    #[serde(default)]
    pub grants: BTreeSet<GrantType>,
}

impl Scope {
    #[must_use]
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            grants: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn with_grant(mut self, grant: GrantType) -> Self {
        self.grants.insert(grant);
        self
    }

    #[must_use]
    pub fn is_grant_allowed(&self, grant: GrantType) -> bool {
        self.grants.contains(&grant)
    }
}
