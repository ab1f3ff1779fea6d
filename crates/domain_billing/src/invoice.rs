//! Invoices and their derivation
//!
//! [`build_invoice`] resolves an invoice from an override and the customer's
//! defaults the same way renewals are derived. Totals are always recomputed
//! from amount and tax unless the caller supplies one explicitly.
//!
//! Invoice numbers are human readable and sequential per year
//! (`INV-2024-0007`). They are allocated outside derivation because the
//! next free number depends on what the store already holds.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::{to_calendar_date, CustomerId, InvoiceId, InvoiceItemId};

use crate::customer::{first_text, Customer};

/// Days between issue and due date when the customer sets none
pub const DEFAULT_DUE_DAYS: i32 = 7;

/// Invoice status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Paid,
    Overdue,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(InvoiceStatus::Draft),
            "sent" => Ok(InvoiceStatus::Sent),
            "paid" => Ok(InvoiceStatus::Paid),
            "overdue" => Ok(InvoiceStatus::Overdue),
            "cancelled" | "canceled" => Ok(InvoiceStatus::Cancelled),
            other => Err(format!("unknown invoice status '{}'", other)),
        }
    }
}

/// A requested line item
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LineItemInput {
    pub description: Option<String>,
    pub quantity: Option<Decimal>,
    pub rate: Option<Decimal>,
    pub amount: Option<Decimal>,
}

/// Optional per-request values for invoice derivation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InvoiceOverride {
    pub amount: Option<Decimal>,
    pub tax: Option<Decimal>,
    pub total: Option<Decimal>,
    pub issue_date: Option<String>,
    pub due_date: Option<String>,
    pub status: Option<String>,
    pub notes: Option<String>,
    pub items: Vec<LineItemInput>,
}

/// A resolved invoice line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub id: InvoiceItemId,
    pub description: String,
    pub quantity: Decimal,
    pub rate: Decimal,
    pub amount: Decimal,
}

impl InvoiceLine {
    pub fn new(description: impl Into<String>, quantity: Decimal, rate: Decimal) -> Self {
        Self {
            id: InvoiceItemId::new(),
            description: description.into(),
            quantity,
            rate,
            amount: round_money(quantity * rate),
        }
    }

    fn from_input(input: &LineItemInput) -> Self {
        let quantity = input.quantity.unwrap_or(Decimal::ONE);
        let rate = input.rate.unwrap_or(Decimal::ZERO);
        let description = first_text([input.description.as_deref()]).unwrap_or_default();
        let mut line = Self::new(description, quantity, rate);
        if let Some(amount) = input.amount {
            line.amount = round_money(amount);
        }
        line
    }
}

/// A fully resolved invoice, not yet numbered or persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceDraft {
    pub customer_id: CustomerId,
    pub amount: Decimal,
    /// Tax rate in percent
    pub tax: Decimal,
    pub total: Decimal,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub status: InvoiceStatus,
    pub notes: Option<String>,
    pub items: Vec<InvoiceLine>,
}

/// `amount + amount * tax / 100`, rounded to cents
pub fn compute_total(amount: Decimal, tax_percent: Decimal) -> Decimal {
    round_money(amount + amount * tax_percent / Decimal::ONE_HUNDRED)
}

fn round_money(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded
}

/// Derives an invoice candidate from a customer and an optional override
///
/// - amount: override, sum of line items, 0
/// - tax: override, customer default rate, 0
/// - total: override, `amount + amount * tax / 100`
/// - issue_date: override, `today`
/// - due_date: override, issue date + customer due days (default 7)
/// - status: override, draft
/// - notes: override, customer default, none
pub fn build_invoice(customer: &Customer, overrides: &InvoiceOverride, today: NaiveDate) -> InvoiceDraft {
    let items: Vec<InvoiceLine> = overrides.items.iter().map(InvoiceLine::from_input).collect();

    let amount = round_money(
        overrides
            .amount
            .unwrap_or_else(|| items.iter().map(|line| line.amount).sum()),
    );

    let tax = overrides
        .tax
        .or(customer.default_tax_rate)
        .unwrap_or(Decimal::ZERO);

    let total = overrides
        .total
        .map(round_money)
        .unwrap_or_else(|| compute_total(amount, tax));

    let issue_date = overrides
        .issue_date
        .as_deref()
        .and_then(to_calendar_date)
        .unwrap_or(today);

    let due_days = customer.default_due_days.unwrap_or(DEFAULT_DUE_DAYS);
    let due_date = overrides
        .due_date
        .as_deref()
        .and_then(to_calendar_date)
        .unwrap_or_else(|| {
            issue_date
                .checked_add_signed(Duration::days(i64::from(due_days)))
                .unwrap_or(issue_date)
        });

    let status = overrides
        .status
        .as_deref()
        .and_then(|s| s.parse::<InvoiceStatus>().ok())
        .unwrap_or(InvoiceStatus::Draft);

    let notes = first_text([
        overrides.notes.as_deref(),
        customer.default_invoice_notes.as_deref(),
    ]);

    InvoiceDraft {
        customer_id: customer.id,
        amount,
        tax,
        total,
        issue_date,
        due_date,
        status,
        notes,
        items,
    }
}

/// A persisted invoice with its line items
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub invoice_number: String,
    pub customer_id: CustomerId,
    pub amount: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub status: InvoiceStatus,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub notes: Option<String>,
    pub items: Vec<InvoiceLine>,
    pub auto_generated: bool,
    pub billing_cycle: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    pub fn from_draft(draft: InvoiceDraft, invoice_number: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: InvoiceId::new(),
            invoice_number: invoice_number.into(),
            customer_id: draft.customer_id,
            amount: draft.amount,
            tax: draft.tax,
            total: draft.total,
            status: draft.status,
            issue_date: draft.issue_date,
            due_date: draft.due_date,
            notes: draft.notes,
            items: draft.items,
            auto_generated: false,
            billing_cycle: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Marks the invoice as system-generated for one billing cycle
    pub fn with_billing_cycle(mut self, billing_cycle: impl Into<String>) -> Self {
        self.auto_generated = true;
        self.billing_cycle = Some(billing_cycle.into());
        self
    }

    pub fn is_past_due(&self, today: NaiveDate) -> bool {
        self.status == InvoiceStatus::Sent && self.due_date < today
    }
}

/// Sequential invoice numbers of the form `INV-<year>-<seq>`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvoiceNumber {
    pub year: i32,
    pub sequence: u32,
}

impl InvoiceNumber {
    pub const PREFIX: &'static str = "INV";

    /// Prefix shared by every number issued in `year`, e.g. `INV-2024-`
    pub fn year_prefix(year: i32) -> String {
        format!("{}-{:04}-", Self::PREFIX, year)
    }

    /// The number following `last` within the year of `issue_date`
    ///
    /// Numbers from other years, or strings that are not invoice numbers,
    /// restart the sequence at 1.
    pub fn next_after(last: Option<&str>, issue_date: NaiveDate) -> Self {
        let year = issue_date.year();
        let sequence = last
            .and_then(|s| s.parse::<InvoiceNumber>().ok())
            .filter(|n| n.year == year)
            .map_or(1, |n| n.sequence.saturating_add(1));
        Self { year, sequence }
    }

    pub fn successor(&self) -> Self {
        Self {
            year: self.year,
            sequence: self.sequence.saturating_add(1),
        }
    }
}

impl fmt::Display for InvoiceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:04}", Self::year_prefix(self.year), self.sequence)
    }
}

impl FromStr for InvoiceNumber {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().splitn(3, '-');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(prefix), Some(year), Some(seq)) if prefix == Self::PREFIX => {
                let year = year.parse().map_err(|_| format!("bad year in '{}'", s))?;
                let sequence = seq.parse().map_err(|_| format!("bad sequence in '{}'", s))?;
                Ok(Self { year, sequence })
            }
            _ => Err(format!("'{}' is not an invoice number", s)),
        }
    }
}
