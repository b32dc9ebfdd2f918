//! Tally Database Layer
//!
//! This crate provides PostgreSQL database access and repository
//! implementations for the Tally metering engine. It includes:
//!
//! - Connection pool management with sqlx
//! - The append-only credit ledger with derived balances
//! - Monthly cap, membership, and usage event repositories
//! - The advisory scope lock serializing writers per scope
//! - Embedded schema migrations

pub mod pool;
pub mod repositories;

pub use pool::{create_pool, run_migrations};
pub use repositories::*;

// Re-export commonly used types
pub use sqlx::{PgPool, Postgres, Transaction};
pub use tally_core::{AppError, AppResult};
