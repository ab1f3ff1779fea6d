//! Customer billing defaults
//!
//! The billing core never edits customers. It reads the recurring plan and
//! the per-customer defaults that feed renewal and invoice derivation.

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::{add_months, CustomerId};

use crate::renewal::RenewalStatus;

/// Billing cadence of a recurring customer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurringInterval {
    Monthly,
    Yearly,
}

impl RecurringInterval {
    /// Length of one cycle in calendar months
    pub fn months(&self) -> i32 {
        match self {
            RecurringInterval::Monthly => 1,
            RecurringInterval::Yearly => 12,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecurringInterval::Monthly => "monthly",
            RecurringInterval::Yearly => "yearly",
        }
    }

    /// Key identifying the billing cycle a date falls in
    ///
    /// `2024-03` for monthly plans, `2024` for yearly plans.
    pub fn cycle_key(&self, date: NaiveDate) -> String {
        match self {
            RecurringInterval::Monthly => format!("{:04}-{:02}", date.year(), date.month()),
            RecurringInterval::Yearly => format!("{:04}", date.year()),
        }
    }
}

impl fmt::Display for RecurringInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecurringInterval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "monthly" => Ok(RecurringInterval::Monthly),
            "yearly" | "annual" | "annually" => Ok(RecurringInterval::Yearly),
            other => Err(format!("unknown recurring interval '{}'", other)),
        }
    }
}

/// A customer as seen by the billing core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub name: String,
    /// Destination for WhatsApp reminders
    pub whatsapp_number: Option<String>,
    /// General service description, second fallback for renewal service
    pub service: Option<String>,

    pub recurring_enabled: bool,
    pub recurring_interval: Option<RecurringInterval>,
    pub recurring_amount: Option<Decimal>,
    pub recurring_service: Option<String>,

    pub default_renewal_status: Option<RenewalStatus>,
    pub default_renewal_reminder_days: Option<i32>,
    pub default_renewal_notes: Option<String>,

    pub default_tax_rate: Option<Decimal>,
    pub default_due_days: Option<i32>,
    pub default_invoice_notes: Option<String>,

    /// Basis date of the first derived cycle
    pub created_at: NaiveDate,
}

impl Customer {
    /// Creates a customer with no recurring plan and no defaults
    pub fn new(name: impl Into<String>, created_at: NaiveDate) -> Self {
        Self {
            id: CustomerId::new(),
            name: name.into(),
            whatsapp_number: None,
            service: None,
            recurring_enabled: false,
            recurring_interval: None,
            recurring_amount: None,
            recurring_service: None,
            default_renewal_status: None,
            default_renewal_reminder_days: None,
            default_renewal_notes: None,
            default_tax_rate: None,
            default_due_days: None,
            default_invoice_notes: None,
            created_at,
        }
    }

    /// The plan interval; customers without one are billed monthly
    pub fn interval(&self) -> RecurringInterval {
        self.recurring_interval.unwrap_or(RecurringInterval::Monthly)
    }

    /// End of the first cycle: `created_at` plus one interval
    pub fn first_cycle_end(&self) -> NaiveDate {
        add_months(self.created_at, self.interval().months())
    }

    /// First cycle end (`created_at + k * interval`, k >= 1) on or after `today`
    ///
    /// Cycle ends are always computed from `created_at` so a customer created
    /// on the 31st keeps renewing on month ends instead of drifting to the
    /// 28th after February.
    pub fn cycle_end_on_or_after(&self, today: NaiveDate) -> NaiveDate {
        let step = self.interval().months();
        let elapsed_months = (today.year() - self.created_at.year()) * 12
            + today.month() as i32
            - self.created_at.month() as i32;

        let mut cycles = (elapsed_months / step).max(1);
        while cycles > 1 && add_months(self.created_at, (cycles - 1) * step) >= today {
            cycles -= 1;
        }
        loop {
            let end = add_months(self.created_at, cycles * step);
            if end >= today || end == NaiveDate::MAX {
                return end;
            }
            cycles += 1;
        }
    }
}

/// Returns the first candidate that holds non-whitespace text
pub(crate) fn first_text<'a>(candidates: impl IntoIterator<Item = Option<&'a str>>) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}
