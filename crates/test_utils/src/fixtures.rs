//! Pre-built Test Fixtures
//!
//! Provides reference dates and customers that the billing tests share.
//! Values are fixed so scenario tests read the same on every run.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use rust_decimal_macros::dec;

use core_kernel::{FixedClock, Timezone};
use domain_billing::{Customer, RecurringInterval};

/// Business timezone used by the worker tests
pub static BUSINESS_TIMEZONE: Lazy<Timezone> = Lazy::new(|| "Asia/Kolkata".parse().unwrap_or_default());

/// Calendar dates used across scenario tests
pub struct DateFixtures;

impl DateFixtures {
    /// Builds a date, panicking on invalid input
    pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// A mid-month reference day (2024-02-20)
    pub fn today() -> NaiveDate {
        Self::date(2024, 2, 20)
    }

    /// Last day of January in a leap year
    pub fn jan_31_2024() -> NaiveDate {
        Self::date(2024, 1, 31)
    }

    pub fn leap_day_2024() -> NaiveDate {
        Self::date(2024, 2, 29)
    }

    /// A clock pinned to `date`
    pub fn clock_on(date: NaiveDate) -> FixedClock {
        FixedClock::on_date(date)
    }
}

/// Ready-made customers
pub struct CustomerFixtures;

impl CustomerFixtures {
    /// Monthly hosting customer billed 1000 with 18% tax
    pub fn monthly_hosting() -> Customer {
        let mut customer = Customer::new("Acme Traders", DateFixtures::date(2023, 11, 15));
        customer.whatsapp_number = Some("+919812345678".to_string());
        customer.recurring_enabled = true;
        customer.recurring_interval = Some(RecurringInterval::Monthly);
        customer.recurring_amount = Some(dec!(1000));
        customer.recurring_service = Some("Web Hosting".to_string());
        customer.default_tax_rate = Some(dec!(18));
        customer
    }

    /// Yearly customer created on a leap day
    pub fn yearly_leap_day() -> Customer {
        let mut customer = Customer::new("Leap Ltd", DateFixtures::leap_day_2024());
        customer.recurring_enabled = true;
        customer.recurring_interval = Some(RecurringInterval::Yearly);
        customer.recurring_amount = Some(dec!(12000));
        customer
    }

    /// Monthly customer created on the 31st, with no other defaults
    pub fn month_end() -> Customer {
        let mut customer = Customer::new("Month End Co", DateFixtures::jan_31_2024());
        customer.recurring_interval = Some(RecurringInterval::Monthly);
        customer
    }

    /// A customer with no recurring plan and no defaults
    pub fn bare() -> Customer {
        Customer::new("Walk-in", DateFixtures::date(2024, 1, 1))
    }
}
