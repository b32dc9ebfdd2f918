//! Host-boundary traits and charge results
//!
//! The engine consumes two things from the host environment: who belongs
//! to which organization, and what time it is. Both are traits so tests
//! and alternative hosts can substitute their own implementations.

use crate::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Org membership lookup
///
/// `userId -> Option<orgId>`, read from the host's user store. A user
/// with a non-null org always charges against the org pool.
#[async_trait]
pub trait MembershipLookup: Send + Sync {
    /// Organization the user belongs to, if any
    ///
    /// Returns `UserNotFound` when the user does not exist at all.
    async fn org_of(&self, user_id: Uuid) -> Result<Option<Uuid>, AppError>;
}

/// UTC time source
///
/// Injected rather than read ambiently so month-boundary behavior is
/// testable without waiting for a calendar rollover.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock implementation used in production
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Why a charge was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    /// The organization's shared pool cannot cover the cost
    InsufficientOrgCredits,
    /// The user's personal balance cannot cover the cost
    InsufficientUserCredits,
    /// The user's monthly attribution cap within the org is exhausted
    UserMonthlyCapReached,
}

impl RejectionKind {
    /// Stable wire string for host-facing messages
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionKind::InsufficientOrgCredits => "insufficient_org_credits",
            RejectionKind::InsufficientUserCredits => "insufficient_user_credits",
            RejectionKind::UserMonthlyCapReached => "user_monthly_cap_reached",
        }
    }
}

impl fmt::Display for RejectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a charge attempt
///
/// Rejections are expected, recoverable outcomes, returned as values so
/// the host can surface a specific user-facing message. Only persistence
/// failures become `AppError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChargeOutcome {
    /// The operation was paid for and may proceed
    Authorized { remaining_balance: i64 },
    /// The operation must not proceed; nothing was written
    Rejected { kind: RejectionKind },
}

impl ChargeOutcome {
    pub fn is_authorized(&self) -> bool {
        matches!(self, ChargeOutcome::Authorized { .. })
    }
}
