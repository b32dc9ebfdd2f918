//! Unified error handling for the Tally metering engine
//!
//! This module provides a single error type covering every failure the
//! engine can surface to the host application. Affordability rejections are
//! deliberately NOT errors: a charge that fails its balance or cap check is
//! a `ChargeOutcome::Rejected` value (see `traits`), while this type covers
//! persistence failures and invalid administrative input.

use thiserror::Error;

/// Main application error type
///
/// All errors in the engine are converted to this type. Hosts map
/// `error_code()` strings to their own response layer.
#[derive(Error, Debug)]
pub enum AppError {
    // ==================== Persistence Errors ====================
    #[error("Database error: {0}")]
    Database(String),

    #[error("Database pool error: {0}")]
    Pool(String),

    #[error("Transaction failed: {0}")]
    Transaction(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    // ==================== Lookup Errors ====================
    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Organization not found: {0}")]
    OrgNotFound(String),

    // ==================== Administrative Errors ====================
    #[error("Invalid adjustment: {0}")]
    InvalidAdjustment(String),

    // ==================== Internal Errors ====================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AppError {
    /// Returns the error code for host-facing responses
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "database_error",
            AppError::Pool(_) => "pool_error",
            AppError::Transaction(_) => "transaction_error",
            AppError::Migration(_) => "migration_error",
            AppError::UserNotFound(_) => "user_not_found",
            AppError::OrgNotFound(_) => "org_not_found",
            AppError::InvalidAdjustment(_) => "invalid_adjustment",
            AppError::Internal(_) => "internal_error",
            AppError::Config(_) => "config_error",
            AppError::Serialization(_) => "serialization_error",
        }
    }

    /// True for storage-layer failures.
    ///
    /// During a charge these mean "not authorized": the gated operation
    /// must not proceed, since proceeding without a ledger row would give
    /// away free usage.
    pub fn is_persistence(&self) -> bool {
        matches!(
            self,
            AppError::Database(_)
                | AppError::Pool(_)
                | AppError::Transaction(_)
                | AppError::Migration(_)
        )
    }
}

// ==================== From implementations ====================

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}
