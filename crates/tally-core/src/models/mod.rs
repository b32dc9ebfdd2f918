//! Domain models for the Tally metering engine

pub mod auth;
pub mod cap;
pub mod ledger;
pub mod scope;
pub mod usage;

pub use auth::AuthContext;
pub use cap::{CapStatus, MonthlyCap};
pub use ledger::{LedgerEntry, LedgerEntryDraft};
pub use scope::{Scope, ScopeType};
pub use usage::UsageEvent;
