//! Usage event model
//!
//! A reporting-only record of completed paid operations. Written once per
//! successful charge and read for dashboards; never consulted to compute
//! balances or authorize charges.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One completed paid operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageEvent {
    /// Unique identifier
    pub id: Uuid,

    /// User who performed the operation
    pub user_id: Uuid,

    /// Organization the charge was billed to, if any
    pub org_id: Option<Uuid>,

    /// Human-readable description of the operation
    pub description: String,

    /// Timestamp of the operation
    pub created_at: DateTime<Utc>,
}
