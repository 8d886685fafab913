//! Billing cycle date math.
//!
//! Pure, deterministic computations: given a cycle specification and a
//! reference date, derive the next billing date and the period a billing
//! date covers. No I/O, no clock access; the same inputs always produce
//! the same result.

use serde::{Deserialize, Serialize};
use time::util::days_in_year_month;
use time::{Date, Duration, Month};

/// Recurrence rule for a recurring service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleType {
    Monthly,
    Weekly,
    Yearly,
    /// Fixed interval of `interval_days` days.
    XDays,
}

impl CycleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleType::Monthly => "monthly",
            CycleType::Weekly => "weekly",
            CycleType::Yearly => "yearly",
            CycleType::XDays => "x_days",
        }
    }

    /// Forgiving parse: `None` for anything unrecognized. Callers fall back
    /// to a plain one-month advance so a malformed cycle never stalls a
    /// service; see [`BillingCycleSpec::next_billing_date`].
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "monthly" => Some(CycleType::Monthly),
            "weekly" => Some(CycleType::Weekly),
            "yearly" => Some(CycleType::Yearly),
            "x_days" => Some(CycleType::XDays),
            _ => None,
        }
    }
}

/// Cycle configuration embedded in a service record.
///
/// Only the fields relevant to `cycle_type` are consulted; the rest are
/// carried along untouched, never validated as absent.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BillingCycleSpec {
    pub cycle_type: String,
    /// Day 1-31, clamped to the last valid day of shorter months.
    pub day_of_month: Option<i32>,
    /// Reserved for weekly anchoring; not consulted by the date math.
    pub day_of_week: Option<i32>,
    /// Month 1-12, combined with `day_of_month` for yearly cycles.
    pub month_of_year: Option<i32>,
    /// Interval for `x_days` cycles; must be positive.
    pub interval_days: Option<i32>,
}

/// Date range covered by one payment.
///
/// `start <= end` holds whenever `billing_date >= service_start`, which the
/// scheduler guarantees by seeding billing dates from the service start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillingPeriod {
    pub start: Date,
    pub end: Date,
}

impl BillingCycleSpec {
    pub fn cycle(&self) -> Option<CycleType> {
        CycleType::parse(&self.cycle_type)
    }

    /// Next billing date, strictly after `from`.
    ///
    /// Fallbacks: an `x_days` cycle without a positive `interval_days`, and
    /// any unrecognized `cycle_type`, advance by one plain calendar month.
    /// Unlike a `monthly` cycle the fallback never applies the
    /// `day_of_month` clamp.
    pub fn next_billing_date(&self, from: Date) -> Date {
        match self.cycle() {
            Some(CycleType::Monthly) => {
                let next = add_months(from, 1);
                match self.day_of_month {
                    Some(day) => with_clamped_day(next, day),
                    None => next,
                }
            }
            Some(CycleType::Weekly) => from + Duration::weeks(1),
            Some(CycleType::Yearly) => {
                let next = add_months(from, 12);
                match (self.month_of_year, self.day_of_month) {
                    // The anchor is recomputed from the spec every call, not
                    // incrementally drifted from the input date.
                    (Some(month), Some(day)) => anchor_in_year(next, month, day),
                    _ => next,
                }
            }
            Some(CycleType::XDays) => match self.interval_days {
                Some(days) if days > 0 => from + Duration::days(i64::from(days)),
                _ => add_months(from, 1),
            },
            None => add_months(from, 1),
        }
    }

    /// Period covered by a payment due on `billing_date`: one cycle unit
    /// back, clamped so the first period of a young service starts at the
    /// service itself rather than before it existed.
    pub fn billing_period(&self, service_start: Date, billing_date: Date) -> BillingPeriod {
        let naive_start = match self.cycle() {
            Some(CycleType::Monthly) => add_months(billing_date, -1),
            Some(CycleType::Weekly) => billing_date - Duration::weeks(1),
            Some(CycleType::Yearly) => add_months(billing_date, -12),
            Some(CycleType::XDays) => match self.interval_days {
                Some(days) if days > 0 => billing_date - Duration::days(i64::from(days)),
                _ => add_months(billing_date, -1),
            },
            None => add_months(billing_date, -1),
        };

        let start = if naive_start < service_start {
            service_start
        } else {
            naive_start
        };

        BillingPeriod {
            start,
            end: billing_date,
        }
    }
}

/// Calendar-month arithmetic with the day clamped to the target month's
/// length, so Jan 31 + 1 month is Feb 29 in a leap year and Feb 28 otherwise.
fn add_months(date: Date, months: i32) -> Date {
    let zero_based = date.year() * 12 + (date.month() as i32 - 1) + months;
    let year = zero_based.div_euclid(12);
    let month =
        Month::try_from((zero_based.rem_euclid(12) + 1) as u8).unwrap_or_else(|_| date.month());
    let day = date.day().min(days_in_year_month(year, month));
    Date::from_calendar_date(year, month, day).unwrap_or(date)
}

fn with_clamped_day(date: Date, day: i32) -> Date {
    let day = (day.clamp(1, 31) as u8).min(days_in_year_month(date.year(), date.month()));
    date.replace_day(day).unwrap_or(date)
}

fn anchor_in_year(date: Date, month: i32, day: i32) -> Date {
    let month = Month::try_from(month.clamp(1, 12) as u8).unwrap_or_else(|_| date.month());
    let day = (day.clamp(1, 31) as u8).min(days_in_year_month(date.year(), month));
    Date::from_calendar_date(date.year(), month, day).unwrap_or(date)
}
