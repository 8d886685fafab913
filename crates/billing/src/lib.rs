// Billing crate clippy configuration
// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Crewdesk Recurring Billing
//!
//! Generates recurring stakeholder service payments on a schedule.
//!
//! ## Features
//!
//! - **Cycle Math**: Next billing date and billing period from a cycle spec
//! - **Idempotent Scheduling**: At most one payment per service per period
//! - **Snapshots**: Vendor identity and line items copied at creation time
//! - **Run Reports**: Per-run counts with per-service error aggregation
//! - **Invariants**: Runnable consistency checks over billing data

pub mod cycle;
pub mod error;
pub mod invariants;
pub mod models;
pub mod report;
pub mod scheduler;
pub mod store;

#[cfg(test)]
pub(crate) mod testutil;

// Cycle math
pub use cycle::{BillingCycleSpec, BillingPeriod, CycleType};

// Error
pub use error::{BillingError, BillingResult};

// Invariants
pub use invariants::{
    InvariantCheckSummary, InvariantChecker, InvariantViolation, ViolationSeverity,
};

// Models
pub use models::{
    Direction, NewLineItem, NewNotification, NewPayment, Payment, PaymentLineItem, Service,
    ServiceDateUpdate, ServiceLineItem, ServiceStatus, StakeholderSnapshot,
};

// Reports
pub use report::{RunError, RunReport};

// Scheduler
pub use scheduler::RecurringPaymentScheduler;

// Store
pub use store::{BillingStore, PgBillingStore};
