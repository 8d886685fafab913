//! Domain records for the recurring billing engine.
//!
//! Service and stakeholder rows are owned by the main Crewdesk app and read
//! here; payments, payment line items, and notifications are written here.
//! Enum-like columns are stored as text, matching how the rest of the
//! platform stores them; the enums below give the valid values a name.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::Date;
use uuid::Uuid;

use crate::cycle::BillingCycleSpec;

/// Lifecycle state of a recurring service agreement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Active,
    Paused,
    Ended,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Active => "active",
            ServiceStatus::Paused => "paused",
            ServiceStatus::Ended => "ended",
        }
    }
}

/// Money direction of a service. Only incoming services are auto-billed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Incoming,
    Outgoing,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Incoming => "incoming",
            Direction::Outgoing => "outgoing",
        }
    }
}

/// A recurring billing agreement with a stakeholder.
///
/// The scheduler never creates or deletes services; its only writes are the
/// `last_billed_date` / `next_billing_date` advancement.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Service {
    pub id: Uuid,
    pub company_id: Uuid,
    pub stakeholder_id: Uuid,
    pub service_name: String,
    pub currency: String,
    /// Tax percentage, 0-100.
    pub tax_rate: Decimal,
    pub direction: String,
    pub status: String,
    pub auto_create_payment: bool,
    #[sqlx(flatten)]
    pub cycle: BillingCycleSpec,
    /// Billing periods never start before this date.
    pub start_date: Date,
    pub last_billed_date: Option<Date>,
    pub next_billing_date: Option<Date>,
    /// Loaded alongside the service, ordered by `item_order`.
    #[sqlx(skip)]
    pub line_items: Vec<ServiceLineItem>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ServiceLineItem {
    pub id: Uuid,
    pub service_id: Uuid,
    pub item_order: i32,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub amount: Decimal,
}

/// One generated payment, at most one per (service, billing period).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub service_id: Uuid,
    pub company_id: Uuid,
    pub stakeholder_id: Uuid,
    pub billing_period_start: Date,
    pub billing_period_end: Date,
    pub subtotal: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub currency: String,
    pub status: String,
    /// Stakeholder identity as of creation; never updated afterwards.
    pub vendor_snapshot: Value,
}

/// Insert form of [`Payment`]; the store assigns the id and sets the
/// initial `pending` status.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub service_id: Uuid,
    pub company_id: Uuid,
    pub stakeholder_id: Uuid,
    pub billing_period_start: Date,
    pub billing_period_end: Date,
    pub subtotal: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub currency: String,
    pub vendor_snapshot: Value,
}

/// Line item copied from the service onto a payment at creation time.
/// A snapshot, not a live reference: later edits to the service's line
/// items do not touch payments already generated.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PaymentLineItem {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub item_order: i32,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub amount: Decimal,
}

/// Insert form of [`PaymentLineItem`]; the payment id is attached by the
/// store once the payment row exists.
#[derive(Debug, Clone)]
pub struct NewLineItem {
    pub item_order: i32,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub amount: Decimal,
}

/// Denormalized stakeholder identity used for vendor snapshots. The store
/// adapter always returns a single flat object, whatever join shape the
/// underlying query produces.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StakeholderSnapshot {
    pub name: String,
    pub address: Option<String>,
    pub contact_persons: Value,
}

impl StakeholderSnapshot {
    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "name": self.name,
            "address": self.address,
            "contact_persons": self.contact_persons,
        })
    }
}

/// Billing-pointer advancement for one service. `last_billed_date` is only
/// set on the payment-creation path; the duplicate-skip path advances
/// `next_billing_date` alone.
#[derive(Debug, Clone, Copy)]
pub struct ServiceDateUpdate {
    pub service_id: Uuid,
    pub last_billed_date: Option<Date>,
    pub next_billing_date: Date,
}

/// Notification record enqueued after a payment is created. Delivery is
/// someone else's job; a failed enqueue never fails the payment.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub company_id: Uuid,
    pub stakeholder_id: Option<Uuid>,
    pub kind: String,
    pub payload: Value,
}
