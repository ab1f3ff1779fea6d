//! Property-Based Test Generators
//!
//! Provides proptest strategies for calendar dates, amounts and customers
//! that respect the billing domain's invariants.

use chrono::{Datelike, NaiveDate};
use proptest::prelude::*;
use rust_decimal::Decimal;

use domain_billing::{Customer, RecurringInterval};

/// Any calendar date between 1990 and 2099
pub fn date_strategy() -> impl Strategy<Value = NaiveDate> {
    (1990i32..2100, 1u32..=12, 1u32..=31).prop_filter_map("invalid date", |(y, m, d)| {
        NaiveDate::from_ymd_opt(y, m, d)
    })
}

/// The last day of some month between 1990 and 2099
pub fn month_end_strategy() -> impl Strategy<Value = NaiveDate> {
    (1990i32..2100, 1u32..=12).prop_filter_map("invalid month", |(y, m)| {
        let (ny, nm) = if m == 12 { (y + 1, 1) } else { (y, m + 1) };
        NaiveDate::from_ymd_opt(ny, nm, 1).and_then(|d| d.pred_opt())
    })
}

/// A date together with a later date no more than ten years apart
pub fn ordered_dates_strategy() -> impl Strategy<Value = (NaiveDate, NaiveDate)> {
    (date_strategy(), 0i64..3650).prop_map(|(start, offset)| {
        (start, start + chrono::Duration::days(offset))
    })
}

pub fn interval_strategy() -> impl Strategy<Value = RecurringInterval> {
    prop_oneof![Just(RecurringInterval::Monthly), Just(RecurringInterval::Yearly)]
}

/// Non-negative money amounts with two decimal places
pub fn amount_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..100_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// Tax percentages from 0% to 40% with two decimal places
pub fn tax_rate_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..4000i64).prop_map(|n| Decimal::new(n, 2))
}

/// Reminder offsets in days before expiry
pub fn reminder_offsets_strategy() -> impl Strategy<Value = Vec<i32>> {
    prop::collection::vec(0i32..90, 1..5)
}

/// Recurring customers with an arbitrary creation date and plan
pub fn recurring_customer_strategy() -> impl Strategy<Value = Customer> {
    (date_strategy(), interval_strategy(), amount_strategy()).prop_map(|(created_at, interval, amount)| {
        let mut customer = Customer::new("Generated Customer", created_at);
        customer.recurring_enabled = true;
        customer.recurring_interval = Some(interval);
        customer.recurring_amount = Some(amount);
        customer
    })
}
