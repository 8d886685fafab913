//! Billing Invariants Module
//!
//! Provides runnable consistency checks for the billing data. These can be
//! run after any batch run or backfill to ensure the system is in a valid
//! state.
//!
//! ## Design Principles
//!
//! 1. **Executable**: Each invariant is a real SQL query that can be run
//! 2. **Explanatory**: Violations include enough context to debug
//! 3. **Non-destructive**: Checks only read, never write

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::error::BillingResult;

/// Result of running a single invariant check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantViolation {
    /// Which invariant was violated
    pub invariant: String,
    /// Service(s) affected
    pub service_ids: Vec<Uuid>,
    /// Human-readable description of the violation
    pub description: String,
    /// Additional context for debugging
    pub context: serde_json::Value,
    /// Severity level
    pub severity: ViolationSeverity,
}

/// Severity of an invariant violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationSeverity {
    /// Critical - payments may be wrong or duplicated
    Critical,
    /// High - data inconsistency that needs attention
    High,
    /// Medium - potential issue, should investigate
    Medium,
    /// Low - minor inconsistency, informational
    Low,
}

impl std::fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationSeverity::Critical => write!(f, "CRITICAL"),
            ViolationSeverity::High => write!(f, "HIGH"),
            ViolationSeverity::Medium => write!(f, "MEDIUM"),
            ViolationSeverity::Low => write!(f, "LOW"),
        }
    }
}

/// Summary of all invariant checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantCheckSummary {
    /// When the check was run
    pub checked_at: OffsetDateTime,
    /// Total number of checks run
    pub checks_run: usize,
    /// Number of checks that passed
    pub checks_passed: usize,
    /// Number of checks that failed
    pub checks_failed: usize,
    /// List of all violations found
    pub violations: Vec<InvariantViolation>,
    /// Overall health status
    pub healthy: bool,
}

/// Row type for payments missing line items
#[derive(Debug, sqlx::FromRow)]
struct PaymentWithoutItemsRow {
    payment_id: Uuid,
    service_id: Uuid,
}

/// Row type for duplicate payments per period
#[derive(Debug, sqlx::FromRow)]
struct DuplicatePeriodRow {
    service_id: Uuid,
    billing_period_start: Date,
    billing_period_end: Date,
    payment_count: i64,
}

/// Row type for active services missing a billing pointer
#[derive(Debug, sqlx::FromRow)]
struct StalledServiceRow {
    service_id: Uuid,
    service_name: String,
}

/// Row type for payments whose totals don't add up
#[derive(Debug, sqlx::FromRow)]
struct TotalsMismatchRow {
    payment_id: Uuid,
    service_id: Uuid,
    subtotal: rust_decimal::Decimal,
    tax_amount: rust_decimal::Decimal,
    total_amount: rust_decimal::Decimal,
}

/// Service for running billing invariant checks
pub struct InvariantChecker {
    pool: PgPool,
}

impl InvariantChecker {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run all invariant checks and return summary
    pub async fn run_all_checks(&self) -> BillingResult<InvariantCheckSummary> {
        let now = OffsetDateTime::now_utc();
        let mut violations = Vec::new();

        violations.extend(self.check_payment_has_line_items().await?);
        violations.extend(self.check_unique_payment_per_period().await?);
        violations.extend(self.check_active_service_has_next_billing_date().await?);
        violations.extend(self.check_payment_totals_consistent().await?);

        let checks_run = 4;
        let checks_failed = violations
            .iter()
            .map(|v| &v.invariant)
            .collect::<std::collections::HashSet<_>>()
            .len();
        let checks_passed = checks_run - checks_failed;

        Ok(InvariantCheckSummary {
            checked_at: now,
            checks_run,
            checks_passed,
            checks_failed,
            healthy: violations.is_empty(),
            violations,
        })
    }

    /// Invariant 1: Every payment has at least one line item
    ///
    /// Payment and line-item creation is transactional, so a payment
    /// without items means data written outside the scheduler or predating
    /// the transaction. Such a payment understates what is owed.
    async fn check_payment_has_line_items(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<PaymentWithoutItemsRow> = sqlx::query_as(
            r#"
            SELECT p.id as payment_id, p.service_id
            FROM payments p
            WHERE NOT EXISTS (
                SELECT 1 FROM payment_line_items li WHERE li.payment_id = p.id
            )
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "payment_has_line_items".to_string(),
                service_ids: vec![row.service_id],
                description: "Payment has no line items".to_string(),
                context: serde_json::json!({
                    "payment_id": row.payment_id,
                }),
                severity: ViolationSeverity::Critical,
            })
            .collect())
    }

    /// Invariant 2: At most one payment per (service, billing period)
    ///
    /// The unique index makes this unreachable through normal operation;
    /// a violation means the index was dropped or rows were copied in.
    async fn check_unique_payment_per_period(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<DuplicatePeriodRow> = sqlx::query_as(
            r#"
            SELECT service_id, billing_period_start, billing_period_end,
                   COUNT(*) as payment_count
            FROM payments
            GROUP BY service_id, billing_period_start, billing_period_end
            HAVING COUNT(*) > 1
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "unique_payment_per_period".to_string(),
                service_ids: vec![row.service_id],
                description: format!(
                    "Service has {} payments for the same billing period (expected 1)",
                    row.payment_count
                ),
                context: serde_json::json!({
                    "billing_period_start": row.billing_period_start.to_string(),
                    "billing_period_end": row.billing_period_end.to_string(),
                    "payment_count": row.payment_count,
                }),
                severity: ViolationSeverity::Critical,
            })
            .collect())
    }

    /// Invariant 3: Active auto-billing services have a next billing date
    ///
    /// A NULL `next_billing_date` on an eligible service means it can never
    /// come due; the service is silently stalled.
    async fn check_active_service_has_next_billing_date(
        &self,
    ) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<StalledServiceRow> = sqlx::query_as(
            r#"
            SELECT id as service_id, service_name
            FROM stakeholder_services
            WHERE status = 'active'
              AND auto_create_payment = true
              AND direction = 'incoming'
              AND next_billing_date IS NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "active_service_has_next_billing_date".to_string(),
                service_ids: vec![row.service_id],
                description: format!(
                    "Active auto-billing service '{}' has no next_billing_date",
                    row.service_name
                ),
                context: serde_json::json!({
                    "service_name": row.service_name,
                }),
                severity: ViolationSeverity::High,
            })
            .collect())
    }

    /// Invariant 4: subtotal + tax_amount = total_amount on every payment
    async fn check_payment_totals_consistent(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<TotalsMismatchRow> = sqlx::query_as(
            r#"
            SELECT id as payment_id, service_id, subtotal, tax_amount, total_amount
            FROM payments
            WHERE subtotal + tax_amount <> total_amount
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "payment_totals_consistent".to_string(),
                service_ids: vec![row.service_id],
                description: format!(
                    "Payment totals don't add up: {} + {} != {}",
                    row.subtotal, row.tax_amount, row.total_amount
                ),
                context: serde_json::json!({
                    "payment_id": row.payment_id,
                    "subtotal": row.subtotal,
                    "tax_amount": row.tax_amount,
                    "total_amount": row.total_amount,
                }),
                severity: ViolationSeverity::High,
            })
            .collect())
    }

    /// Run a single invariant check by name
    pub async fn run_check(&self, name: &str) -> BillingResult<Vec<InvariantViolation>> {
        match name {
            "payment_has_line_items" => self.check_payment_has_line_items().await,
            "unique_payment_per_period" => self.check_unique_payment_per_period().await,
            "active_service_has_next_billing_date" => {
                self.check_active_service_has_next_billing_date().await
            }
            "payment_totals_consistent" => self.check_payment_totals_consistent().await,
            _ => Ok(vec![]),
        }
    }

    /// Get list of all available invariant checks
    pub fn available_checks() -> Vec<&'static str> {
        vec![
            "payment_has_line_items",
            "unique_payment_per_period",
            "active_service_has_next_billing_date",
            "payment_totals_consistent",
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_severity_display() {
        assert_eq!(ViolationSeverity::Critical.to_string(), "CRITICAL");
        assert_eq!(ViolationSeverity::High.to_string(), "HIGH");
        assert_eq!(ViolationSeverity::Medium.to_string(), "MEDIUM");
        assert_eq!(ViolationSeverity::Low.to_string(), "LOW");
    }

    #[test]
    fn test_available_checks() {
        let checks = InvariantChecker::available_checks();
        assert_eq!(checks.len(), 4);
        assert!(checks.contains(&"payment_has_line_items"));
        assert!(checks.contains(&"unique_payment_per_period"));
    }
}
