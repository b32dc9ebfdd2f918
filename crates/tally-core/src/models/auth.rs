//! Request authentication context
//!
//! Supplied by the host application per request. The engine never derives
//! admin status itself; the single `is_admin_bypass` capability here is
//! the only admin check the charge path consults.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity and capability of the requesting caller
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AuthContext {
    /// The requesting user
    pub user_id: Uuid,

    /// Administrators bypass all affordability checks and are not charged
    pub is_admin_bypass: bool,
}

impl AuthContext {
    /// Context for a regular, metered caller
    pub fn member(user_id: Uuid) -> Self {
        Self {
            user_id,
            is_admin_bypass: false,
        }
    }

    /// Context for an administrator exempt from metering
    pub fn admin(user_id: Uuid) -> Self {
        Self {
            user_id,
            is_admin_bypass: true,
        }
    }
}
