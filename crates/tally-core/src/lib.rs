//! Tally Core Library
//!
//! This crate provides the foundational types, traits, and error handling
//! for the Tally metering engine. It includes:
//!
//! - Domain models (Scope, LedgerEntry, MonthlyCap, UsageEvent, AuthContext)
//! - Host-boundary traits (MembershipLookup, Clock) and charge outcomes
//! - Unified error handling with stable error codes
//! - Application configuration

pub mod config;
pub mod error;
pub mod models;
pub mod traits;

pub use config::AppConfig;
pub use error::AppError;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
