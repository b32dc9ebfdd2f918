//! Business logic services for the Tally metering engine
//!
//! This crate contains the services that orchestrate metering operations:
//! scope resolution, monthly cap enforcement, charge authorization, and
//! administrative adjustments.
//!
//! # Architecture
//!
//! Services are designed to be composable and testable:
//! - Host-boundary dependencies (membership, clock) are trait objects
//! - Services are wrapped in Arc for safe sharing across async tasks
//! - Every writer runs one transaction under the per-scope advisory lock
//! - All operations are instrumented with tracing
//!
//! # Services
//!
//! - `ScopeResolver` - org pool vs personal balance resolution
//! - `CapEnforcer` - monthly window computation and cap standing
//! - `ChargeAuthorizer` - atomic check-then-debit for paid operations
//! - `AdjustmentService` - grants and exact-balance resets

pub mod adjustments;
pub mod authorizer;
pub mod caps;
pub mod scope;

pub use adjustments::AdjustmentService;
pub use authorizer::ChargeAuthorizer;
pub use caps::{month_window, CapEnforcer};
pub use scope::ScopeResolver;
