//! Repository implementations
//!
//! PostgreSQL-backed storage for the metering engine's entities.

pub mod cap_repo;
pub mod ledger_repo;
pub mod membership_repo;
pub mod usage_repo;

pub use cap_repo::PgMonthlyCapRepository;
pub use ledger_repo::{scope_lock, PgLedgerRepository};
pub use membership_repo::PgMembershipRepository;
pub use usage_repo::PgUsageEventRepository;

use tally_core::models::ScopeType;

/// Convert a database scope type string to the enum
pub(crate) fn parse_scope_type(s: &str) -> ScopeType {
    ScopeType::from_str(s).unwrap_or(ScopeType::User)
}
