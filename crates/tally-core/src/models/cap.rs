//! Monthly cap model
//!
//! A cap bounds how much of an organization's shared pool one member may
//! consume per calendar month. Caps are current policy, not history, so
//! rows are mutated in place by administrators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-user monthly consumption cap within an organization
///
/// At most one active row per (org, user) pair is meaningful. A `None`
/// cap, or the absence of an active row, means unlimited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthlyCap {
    /// Unique identifier
    pub id: i64,

    /// Organization whose pool the cap applies within
    pub org_id: Uuid,

    /// Member the cap applies to
    pub user_id: Uuid,

    /// Maximum credits per calendar month; `None` = unlimited
    pub cap: Option<i64>,

    /// Whether this row is the pair's current policy
    pub active: bool,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

/// Snapshot of a user's cap standing for the current month
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapStatus {
    /// Configured cap; `None` = unlimited
    pub cap: Option<i64>,

    /// Credits consumed from the org pool by this user this month
    pub spent_this_month: i64,

    /// Credits still available under the cap; `None` = unlimited
    pub remaining: Option<i64>,
}

impl CapStatus {
    /// Whether a charge of `cost` would pass the cap check
    pub fn allows(&self, cost: i64) -> bool {
        match self.remaining {
            Some(remaining) => remaining >= cost,
            None => true,
        }
    }
}
