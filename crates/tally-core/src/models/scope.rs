//! Billing scope model
//!
//! A scope is the unit a ledger entry applies to: an organization's shared
//! credit pool or an individual user's personal balance.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Scope type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeType {
    /// Organization-wide shared pool
    Org,
    /// Individual user's personal balance
    User,
}

impl fmt::Display for ScopeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeType::Org => write!(f, "org"),
            ScopeType::User => write!(f, "user"),
        }
    }
}

impl ScopeType {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "org" => Some(ScopeType::Org),
            "user" => Some(ScopeType::User),
            _ => None,
        }
    }

    /// Database representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeType::Org => "org",
            ScopeType::User => "user",
        }
    }
}

/// A fully resolved billing scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub scope_type: ScopeType,
    pub id: Uuid,
}

impl Scope {
    /// Organization pool scope
    pub fn org(id: Uuid) -> Self {
        Self {
            scope_type: ScopeType::Org,
            id,
        }
    }

    /// Personal balance scope
    pub fn user(id: Uuid) -> Self {
        Self {
            scope_type: ScopeType::User,
            id,
        }
    }

    /// Key used to serialize writers on this scope
    pub fn lock_key(&self) -> String {
        format!("{}:{}", self.scope_type, self.id)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scope_type, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_type_roundtrip() {
        assert_eq!(ScopeType::from_str("org"), Some(ScopeType::Org));
        assert_eq!(ScopeType::from_str("USER"), Some(ScopeType::User));
        assert_eq!(ScopeType::from_str("group"), None);
        assert_eq!(ScopeType::Org.as_str(), "org");
        assert_eq!(ScopeType::User.as_str(), "user");
    }

    #[test]
    fn test_lock_key_distinguishes_scope_types() {
        let id = Uuid::new_v4();
        assert_ne!(Scope::org(id).lock_key(), Scope::user(id).lock_key());
        assert!(Scope::org(id).lock_key().starts_with("org:"));
    }
}
