//! Credit ledger model
//!
//! The ledger is the single source of truth for every balance in the
//! system. Entries are immutable signed deltas; a scope's balance is the
//! sum of its entries, never a stored column.

use super::scope::Scope;
use crate::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An immutable ledger entry
///
/// Created by a successful charge (negative delta), an administrative
/// grant (either sign), or an exact-balance reset (a single compensating
/// delta). Never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Unique identifier
    pub id: i64,

    /// Scope the delta applies to
    pub scope: Scope,

    /// Signed credit delta; never zero
    pub delta: i64,

    /// Why this entry exists ("polish", "topup", "reset", ...)
    pub reason: String,

    /// User whose action produced the entry, when attributable
    pub actor_user_id: Option<Uuid>,

    /// Timestamp of the append
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// True for consumption entries (charges against the scope)
    #[inline]
    pub fn is_debit(&self) -> bool {
        self.delta < 0
    }
}

/// Draft of a ledger entry, prior to persistence
#[derive(Debug, Clone)]
pub struct LedgerEntryDraft {
    pub scope: Scope,
    pub delta: i64,
    pub reason: String,
    pub actor_user_id: Option<Uuid>,
}

impl LedgerEntryDraft {
    pub fn new(
        scope: Scope,
        delta: i64,
        reason: impl Into<String>,
        actor_user_id: Option<Uuid>,
    ) -> Self {
        Self {
            scope,
            delta,
            reason: reason.into(),
            actor_user_id,
        }
    }

    /// Reject drafts the ledger must never contain
    pub fn validate(&self) -> AppResult<()> {
        if self.delta == 0 {
            return Err(AppError::InvalidAdjustment(
                "ledger delta must be non-zero".to_string(),
            ));
        }
        if self.reason.trim().is_empty() {
            return Err(AppError::InvalidAdjustment(
                "ledger reason must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
