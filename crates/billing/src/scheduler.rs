//! Recurring payment generation.
//!
//! One [`RecurringPaymentScheduler::run_once`] call processes the full
//! due-set for a day: for each due service it computes the billing period,
//! checks for an existing payment, creates the payment and its line item
//! snapshot if absent, and advances the service's billing pointers. Each
//! service is processed independently; one failure never aborts the batch.

use rust_decimal::Decimal;
use time::Date;
use tracing::{info, warn};

use crate::cycle::BillingPeriod;
use crate::error::{BillingError, BillingResult};
use crate::models::{NewLineItem, NewNotification, NewPayment, Service, ServiceDateUpdate};
use crate::report::{RunError, RunReport};
use crate::store::BillingStore;

/// Why a due service produced no payment this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SkipReason {
    /// Nothing to bill. Dates are deliberately NOT advanced: the service
    /// stays due and visible until an operator adds line items.
    NoLineItems,
    /// A payment for this period already exists. Dates ARE advanced so the
    /// run stops re-detecting the same period forever.
    PeriodAlreadyBilled,
}

enum Outcome {
    Created,
    Skipped(SkipReason),
}

pub struct RecurringPaymentScheduler<S> {
    pub(crate) store: S,
}

impl<S: BillingStore> RecurringPaymentScheduler<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Run one billing tick. `today` is injected rather than read from the
    /// clock, so runs are deterministic and replayable.
    ///
    /// Only a failing due-services query propagates as an error; every
    /// per-service problem lands in the report's `errors` instead.
    pub async fn run_once(&self, today: Date) -> BillingResult<RunReport> {
        let due = self.store.find_due_services(today).await?;
        info!(due = due.len(), %today, "Recurring billing run started");

        let mut report = RunReport::default();
        for service in &due {
            report.processed += 1;
            match self.process_service(service, today).await {
                Ok(Outcome::Created) => report.created += 1,
                Ok(Outcome::Skipped(reason)) => {
                    report.skipped += 1;
                    info!(service_id = %service.id, ?reason, "Service skipped");
                }
                Err(e) => {
                    warn!(service_id = %service.id, error = %e, "Service processing failed");
                    report.errors.push(RunError {
                        service_id: service.id,
                        message: e.to_string(),
                    });
                }
            }
        }

        info!(
            processed = report.processed,
            created = report.created,
            skipped = report.skipped,
            errors = report.errors.len(),
            "Recurring billing run complete"
        );
        Ok(report)
    }

    async fn process_service(&self, service: &Service, today: Date) -> BillingResult<Outcome> {
        let billing_date = service.next_billing_date.unwrap_or(today);

        if service.line_items.is_empty() {
            return Ok(Outcome::Skipped(SkipReason::NoLineItems));
        }

        let BillingPeriod { start, end } = service
            .cycle
            .billing_period(service.start_date, billing_date);

        if self.store.find_payment(service.id, start, end).await?.is_some() {
            self.advance(service, billing_date).await?;
            return Ok(Outcome::Skipped(SkipReason::PeriodAlreadyBilled));
        }

        let subtotal: Decimal = service.line_items.iter().map(|item| item.amount).sum();
        let tax_amount = (subtotal * service.tax_rate / Decimal::from(100)).round_dp(2);
        let total_amount = subtotal + tax_amount;

        let snapshot = self
            .store
            .stakeholder_snapshot(service.stakeholder_id)
            .await?;

        let payment = NewPayment {
            service_id: service.id,
            company_id: service.company_id,
            stakeholder_id: service.stakeholder_id,
            billing_period_start: start,
            billing_period_end: end,
            subtotal,
            tax_rate: service.tax_rate,
            tax_amount,
            total_amount,
            currency: service.currency.clone(),
            vendor_snapshot: snapshot.to_json(),
        };

        let items: Vec<NewLineItem> = service
            .line_items
            .iter()
            .map(|item| NewLineItem {
                item_order: item.item_order,
                description: item.description.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price,
                amount: item.amount,
            })
            .collect();

        let dates = ServiceDateUpdate {
            service_id: service.id,
            last_billed_date: Some(billing_date),
            next_billing_date: service.cycle.next_billing_date(billing_date),
        };

        let created = match self.store.record_payment(payment, items, dates).await {
            Ok(payment) => payment,
            // Lost the race against a concurrent run. The other run's
            // payment stands; advance exactly like the early-check skip.
            Err(BillingError::DuplicatePayment { .. }) => {
                self.advance(service, billing_date).await?;
                return Ok(Outcome::Skipped(SkipReason::PeriodAlreadyBilled));
            }
            Err(e) => return Err(e),
        };

        info!(
            service_id = %service.id,
            payment_id = %created.id,
            period_start = %start,
            period_end = %end,
            total_amount = %created.total_amount,
            "Payment created"
        );

        let notification = NewNotification {
            company_id: service.company_id,
            stakeholder_id: Some(service.stakeholder_id),
            kind: "payment_created".to_string(),
            payload: serde_json::json!({
                "payment_id": created.id,
                "service_id": service.id,
                "service_name": service.service_name,
                "total_amount": created.total_amount,
                "currency": created.currency,
            }),
        };
        if let Err(e) = self.store.enqueue_notification(notification).await {
            warn!(service_id = %service.id, error = %e, "Notification enqueue failed");
        }

        Ok(Outcome::Created)
    }

    /// The skip-advance path: move `next_billing_date` forward, leave
    /// `last_billed_date` alone.
    async fn advance(&self, service: &Service, billing_date: Date) -> BillingResult<()> {
        self.store
            .advance_service(ServiceDateUpdate {
                service_id: service.id,
                last_billed_date: None,
                next_billing_date: service.cycle.next_billing_date(billing_date),
            })
            .await
    }
}
