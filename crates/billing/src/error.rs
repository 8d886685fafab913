//! Billing error types

use time::Date;
use uuid::Uuid;

pub type BillingResult<T> = Result<T, BillingError>;

#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The unique index on (service_id, billing_period_start,
    /// billing_period_end) rejected an insert. A concurrent run created the
    /// payment between our existence check and the insert; the existing
    /// payment stands.
    #[error("payment already exists for service {service_id}, period {period_start} to {period_end}")]
    DuplicatePayment {
        service_id: Uuid,
        period_start: Date,
        period_end: Date,
    },
}
