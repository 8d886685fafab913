//! In-memory [`BillingStore`] and record builders for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::json;
use time::Date;
use uuid::Uuid;

use crate::cycle::BillingCycleSpec;
use crate::error::{BillingError, BillingResult};
use crate::models::{
    Direction, NewLineItem, NewNotification, NewPayment, Payment, PaymentLineItem, Service,
    ServiceDateUpdate, ServiceLineItem, ServiceStatus, StakeholderSnapshot,
};
use crate::store::BillingStore;

#[derive(Default)]
pub(crate) struct MemoryStore {
    pub services: Mutex<Vec<Service>>,
    pub payments: Mutex<Vec<Payment>>,
    pub payment_line_items: Mutex<Vec<PaymentLineItem>>,
    pub stakeholders: Mutex<HashMap<Uuid, StakeholderSnapshot>>,
    pub notification_log: Mutex<Vec<NewNotification>>,
    /// Service ids whose `record_payment` fails with an injected error.
    pub fail_record_services: Mutex<Vec<Uuid>>,
    /// Make `find_payment` return nothing, so inserts collide the way a
    /// concurrent run's would.
    pub hide_payments_from_lookup: AtomicBool,
    pub fail_notifications: AtomicBool,
    pub fail_find_due: AtomicBool,
}

impl MemoryStore {
    pub fn add_service(&self, service: Service) {
        self.services.lock().unwrap().push(service);
    }

    pub fn add_stakeholder(&self, id: Uuid, snapshot: StakeholderSnapshot) {
        self.stakeholders.lock().unwrap().insert(id, snapshot);
    }

    pub fn fail_record_for(&self, service_id: Uuid) {
        self.fail_record_services.lock().unwrap().push(service_id);
    }

    pub fn service(&self, id: Uuid) -> Service {
        self.services
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .unwrap()
    }

    pub fn set_next_billing_date(&self, id: Uuid, next: Option<Date>) {
        let mut services = self.services.lock().unwrap();
        if let Some(service) = services.iter_mut().find(|s| s.id == id) {
            service.next_billing_date = next;
        }
    }

    pub fn payments_for(&self, service_id: Uuid) -> Vec<Payment> {
        self.payments
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.service_id == service_id)
            .cloned()
            .collect()
    }

    pub fn line_items_for(&self, payment_id: Uuid) -> Vec<PaymentLineItem> {
        let mut items: Vec<PaymentLineItem> = self
            .payment_line_items
            .lock()
            .unwrap()
            .iter()
            .filter(|item| item.payment_id == payment_id)
            .cloned()
            .collect();
        items.sort_by_key(|item| item.item_order);
        items
    }

    pub fn notifications(&self) -> Vec<NewNotification> {
        self.notification_log.lock().unwrap().clone()
    }

    fn apply_dates(&self, dates: ServiceDateUpdate) {
        let mut services = self.services.lock().unwrap();
        if let Some(service) = services.iter_mut().find(|s| s.id == dates.service_id) {
            if let Some(last) = dates.last_billed_date {
                service.last_billed_date = Some(last);
            }
            service.next_billing_date = Some(dates.next_billing_date);
        }
    }
}

#[async_trait]
impl BillingStore for MemoryStore {
    async fn find_due_services(&self, today: Date) -> BillingResult<Vec<Service>> {
        if self.fail_find_due.load(Ordering::SeqCst) {
            return Err(BillingError::InvalidInput(
                "injected due-query failure".to_string(),
            ));
        }
        Ok(self
            .services
            .lock()
            .unwrap()
            .iter()
            .filter(|s| {
                s.direction == Direction::Incoming.as_str()
                    && s.status == ServiceStatus::Active.as_str()
                    && s.auto_create_payment
                    && s.next_billing_date.is_some_and(|d| d <= today)
            })
            .cloned()
            .collect())
    }

    async fn find_payment(
        &self,
        service_id: Uuid,
        period_start: Date,
        period_end: Date,
    ) -> BillingResult<Option<Payment>> {
        if self.hide_payments_from_lookup.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(self
            .payments
            .lock()
            .unwrap()
            .iter()
            .find(|p| {
                p.service_id == service_id
                    && p.billing_period_start == period_start
                    && p.billing_period_end == period_end
            })
            .cloned())
    }

    async fn record_payment(
        &self,
        payment: NewPayment,
        items: Vec<NewLineItem>,
        dates: ServiceDateUpdate,
    ) -> BillingResult<Payment> {
        if self
            .fail_record_services
            .lock()
            .unwrap()
            .contains(&payment.service_id)
        {
            return Err(BillingError::InvalidInput(
                "injected store failure".to_string(),
            ));
        }

        {
            let payments = self.payments.lock().unwrap();
            let duplicate = payments.iter().any(|p| {
                p.service_id == payment.service_id
                    && p.billing_period_start == payment.billing_period_start
                    && p.billing_period_end == payment.billing_period_end
            });
            if duplicate {
                return Err(BillingError::DuplicatePayment {
                    service_id: payment.service_id,
                    period_start: payment.billing_period_start,
                    period_end: payment.billing_period_end,
                });
            }
        }

        let stored = Payment {
            id: Uuid::new_v4(),
            service_id: payment.service_id,
            company_id: payment.company_id,
            stakeholder_id: payment.stakeholder_id,
            billing_period_start: payment.billing_period_start,
            billing_period_end: payment.billing_period_end,
            subtotal: payment.subtotal,
            tax_rate: payment.tax_rate,
            tax_amount: payment.tax_amount,
            total_amount: payment.total_amount,
            currency: payment.currency,
            status: "pending".to_string(),
            vendor_snapshot: payment.vendor_snapshot,
        };
        self.payments.lock().unwrap().push(stored.clone());

        let mut line_items = self.payment_line_items.lock().unwrap();
        for item in items {
            line_items.push(PaymentLineItem {
                id: Uuid::new_v4(),
                payment_id: stored.id,
                item_order: item.item_order,
                description: item.description,
                quantity: item.quantity,
                unit_price: item.unit_price,
                amount: item.amount,
            });
        }
        drop(line_items);

        self.apply_dates(dates);
        Ok(stored)
    }

    async fn advance_service(&self, dates: ServiceDateUpdate) -> BillingResult<()> {
        self.apply_dates(dates);
        Ok(())
    }

    async fn stakeholder_snapshot(
        &self,
        stakeholder_id: Uuid,
    ) -> BillingResult<StakeholderSnapshot> {
        self.stakeholders
            .lock()
            .unwrap()
            .get(&stakeholder_id)
            .cloned()
            .ok_or_else(|| BillingError::NotFound(format!("stakeholder {stakeholder_id}")))
    }

    async fn enqueue_notification(&self, notification: NewNotification) -> BillingResult<()> {
        if self.fail_notifications.load(Ordering::SeqCst) {
            return Err(BillingError::InvalidInput(
                "notification queue unavailable".to_string(),
            ));
        }
        self.notification_log.lock().unwrap().push(notification);
        Ok(())
    }
}

pub(crate) fn monthly_spec(day_of_month: Option<i32>) -> BillingCycleSpec {
    BillingCycleSpec {
        cycle_type: "monthly".to_string(),
        day_of_month,
        day_of_week: None,
        month_of_year: None,
        interval_days: None,
    }
}

pub(crate) fn test_service(
    cycle: BillingCycleSpec,
    start_date: Date,
    next_billing_date: Option<Date>,
    line_items: Vec<ServiceLineItem>,
) -> Service {
    let id = Uuid::new_v4();
    Service {
        id,
        company_id: Uuid::new_v4(),
        stakeholder_id: Uuid::new_v4(),
        service_name: "Facility cleaning".to_string(),
        currency: "USD".to_string(),
        tax_rate: Decimal::from(10),
        direction: Direction::Incoming.as_str().to_string(),
        status: ServiceStatus::Active.as_str().to_string(),
        auto_create_payment: true,
        cycle,
        start_date,
        last_billed_date: None,
        next_billing_date,
        line_items: line_items
            .into_iter()
            .map(|mut item| {
                item.service_id = id;
                item
            })
            .collect(),
    }
}

pub(crate) fn test_line_item(item_order: i32, quantity: i64, unit_price: Decimal) -> ServiceLineItem {
    let quantity = Decimal::from(quantity);
    ServiceLineItem {
        id: Uuid::new_v4(),
        service_id: Uuid::nil(),
        item_order,
        description: format!("Line {item_order}"),
        quantity,
        unit_price,
        amount: quantity * unit_price,
    }
}

pub(crate) fn test_snapshot() -> StakeholderSnapshot {
    StakeholderSnapshot {
        name: "Acme Facilities".to_string(),
        address: Some("1 Main St, Springfield".to_string()),
        contact_persons: json!([{ "name": "Jo Woods", "email": "jo@acme.test" }]),
    }
}
