//! Store boundary for the billing engine.
//!
//! The scheduler talks to an abstract [`BillingStore`]; [`PgBillingStore`]
//! is the production Postgres adapter. Joined stakeholder data is
//! normalized to a single flat [`StakeholderSnapshot`] at this boundary so
//! nothing downstream has to care about join shapes.

use async_trait::async_trait;
use sqlx::PgPool;
use time::Date;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::models::{
    NewLineItem, NewNotification, NewPayment, Payment, Service, ServiceDateUpdate,
    StakeholderSnapshot,
};

/// Name of the unique index enforcing one payment per service per period.
const PAYMENT_PERIOD_CONSTRAINT: &str = "uq_payments_service_period";

#[async_trait]
pub trait BillingStore: Send + Sync {
    /// Services due on or before `today`: incoming, active, auto-billing,
    /// with `next_billing_date` set. Line items come loaded in
    /// `item_order`.
    async fn find_due_services(&self, today: Date) -> BillingResult<Vec<Service>>;

    /// Payment for the exact (service, period) tuple, if one exists.
    async fn find_payment(
        &self,
        service_id: Uuid,
        period_start: Date,
        period_end: Date,
    ) -> BillingResult<Option<Payment>>;

    /// Insert the payment and its line items and advance the service's
    /// billing dates as one atomic unit. A crash can therefore never leave
    /// a payment without line items or a service pointing at an
    /// already-paid period.
    async fn record_payment(
        &self,
        payment: NewPayment,
        items: Vec<NewLineItem>,
        dates: ServiceDateUpdate,
    ) -> BillingResult<Payment>;

    /// Advance billing dates without creating a payment (the
    /// duplicate-skip path).
    async fn advance_service(&self, dates: ServiceDateUpdate) -> BillingResult<()>;

    /// Current stakeholder identity for vendor snapshots.
    async fn stakeholder_snapshot(&self, stakeholder_id: Uuid)
        -> BillingResult<StakeholderSnapshot>;

    /// Enqueue a notification record. Callers treat failures as
    /// best-effort: log and move on.
    async fn enqueue_notification(&self, notification: NewNotification) -> BillingResult<()>;
}

/// Postgres adapter.
pub struct PgBillingStore {
    pool: PgPool,
}

impl PgBillingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BillingStore for PgBillingStore {
    async fn find_due_services(&self, today: Date) -> BillingResult<Vec<Service>> {
        let mut services: Vec<Service> = sqlx::query_as(
            r#"
            SELECT id, company_id, stakeholder_id, service_name, currency, tax_rate,
                   direction, status, auto_create_payment,
                   cycle_type, day_of_month, day_of_week, month_of_year, interval_days,
                   start_date, last_billed_date, next_billing_date
            FROM stakeholder_services
            WHERE direction = 'incoming'
              AND status = 'active'
              AND auto_create_payment = true
              AND next_billing_date <= $1
            ORDER BY next_billing_date, id
            "#,
        )
        .bind(today)
        .fetch_all(&self.pool)
        .await?;

        for service in &mut services {
            service.line_items = sqlx::query_as(
                r#"
                SELECT id, service_id, item_order, description, quantity, unit_price, amount
                FROM service_line_items
                WHERE service_id = $1
                ORDER BY item_order, id
                "#,
            )
            .bind(service.id)
            .fetch_all(&self.pool)
            .await?;
        }

        Ok(services)
    }

    async fn find_payment(
        &self,
        service_id: Uuid,
        period_start: Date,
        period_end: Date,
    ) -> BillingResult<Option<Payment>> {
        let payment: Option<Payment> = sqlx::query_as(
            r#"
            SELECT id, service_id, company_id, stakeholder_id,
                   billing_period_start, billing_period_end,
                   subtotal, tax_rate, tax_amount, total_amount,
                   currency, status, vendor_snapshot
            FROM payments
            WHERE service_id = $1
              AND billing_period_start = $2
              AND billing_period_end = $3
            "#,
        )
        .bind(service_id)
        .bind(period_start)
        .bind(period_end)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payment)
    }

    async fn record_payment(
        &self,
        payment: NewPayment,
        items: Vec<NewLineItem>,
        dates: ServiceDateUpdate,
    ) -> BillingResult<Payment> {
        let mut tx = self.pool.begin().await?;

        let inserted: Payment = sqlx::query_as(
            r#"
            INSERT INTO payments (
                service_id, company_id, stakeholder_id,
                billing_period_start, billing_period_end,
                subtotal, tax_rate, tax_amount, total_amount,
                currency, status, vendor_snapshot
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'pending', $11)
            RETURNING id, service_id, company_id, stakeholder_id,
                      billing_period_start, billing_period_end,
                      subtotal, tax_rate, tax_amount, total_amount,
                      currency, status, vendor_snapshot
            "#,
        )
        .bind(payment.service_id)
        .bind(payment.company_id)
        .bind(payment.stakeholder_id)
        .bind(payment.billing_period_start)
        .bind(payment.billing_period_end)
        .bind(payment.subtotal)
        .bind(payment.tax_rate)
        .bind(payment.tax_amount)
        .bind(payment.total_amount)
        .bind(&payment.currency)
        .bind(&payment.vendor_snapshot)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_payment_insert_err(e, &payment))?;

        for item in &items {
            sqlx::query(
                r#"
                INSERT INTO payment_line_items (
                    payment_id, item_order, description, quantity, unit_price, amount
                )
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(inserted.id)
            .bind(item.item_order)
            .bind(&item.description)
            .bind(item.quantity)
            .bind(item.unit_price)
            .bind(item.amount)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"
            UPDATE stakeholder_services
            SET last_billed_date = COALESCE($2, last_billed_date),
                next_billing_date = $3,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(dates.service_id)
        .bind(dates.last_billed_date)
        .bind(dates.next_billing_date)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(inserted)
    }

    async fn advance_service(&self, dates: ServiceDateUpdate) -> BillingResult<()> {
        sqlx::query(
            r#"
            UPDATE stakeholder_services
            SET last_billed_date = COALESCE($2, last_billed_date),
                next_billing_date = $3,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(dates.service_id)
        .bind(dates.last_billed_date)
        .bind(dates.next_billing_date)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn stakeholder_snapshot(
        &self,
        stakeholder_id: Uuid,
    ) -> BillingResult<StakeholderSnapshot> {
        let snapshot: Option<StakeholderSnapshot> = sqlx::query_as(
            "SELECT name, address, contact_persons FROM stakeholders WHERE id = $1",
        )
        .bind(stakeholder_id)
        .fetch_optional(&self.pool)
        .await?;

        snapshot.ok_or_else(|| BillingError::NotFound(format!("stakeholder {stakeholder_id}")))
    }

    async fn enqueue_notification(&self, notification: NewNotification) -> BillingResult<()> {
        sqlx::query(
            r#"
            INSERT INTO notifications (company_id, stakeholder_id, kind, payload)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(notification.company_id)
        .bind(notification.stakeholder_id)
        .bind(&notification.kind)
        .bind(&notification.payload)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn map_payment_insert_err(e: sqlx::Error, payment: &NewPayment) -> BillingError {
    if let sqlx::Error::Database(ref db) = e {
        if db.constraint() == Some(PAYMENT_PERIOD_CONSTRAINT) {
            return BillingError::DuplicatePayment {
                service_id: payment.service_id,
                period_start: payment.billing_period_start,
                period_end: payment.billing_period_end,
            };
        }
    }
    BillingError::Database(e)
}
