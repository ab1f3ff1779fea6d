//! Renewal records and their derivation
//!
//! A renewal tracks when a customer's service must be renewed. Candidates are
//! derived by [`build_renewal`], which resolves every field in a fixed order:
//! the request override, then the customer's stored default, then a literal
//! fallback. Malformed override values are treated as absent.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::{days_until, to_calendar_date, CustomerId, RenewalId};

use crate::customer::{first_text, Customer};

/// Renewals expiring within this many days classify as expiring
pub const EXPIRING_SOON_DAYS: i64 = 7;

/// Reminder lead time used when neither request nor customer sets one
pub const DEFAULT_REMINDER_DAYS: i32 = 30;

/// Service name used when nothing else names the service
pub const DEFAULT_SERVICE: &str = "Service";

/// Renewal lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenewalStatus {
    Active,
    Expiring,
    Expired,
    Renewed,
}

impl RenewalStatus {
    /// Classifies a renewal by the days left until expiry
    pub fn classify(days_until_expiry: i64) -> Self {
        if days_until_expiry < 0 {
            RenewalStatus::Expired
        } else if days_until_expiry <= EXPIRING_SOON_DAYS {
            RenewalStatus::Expiring
        } else {
            RenewalStatus::Active
        }
    }

    /// Open renewals still await a renewal decision
    pub fn is_open(&self) -> bool {
        matches!(self, RenewalStatus::Active | RenewalStatus::Expiring)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RenewalStatus::Active => "active",
            RenewalStatus::Expiring => "expiring",
            RenewalStatus::Expired => "expired",
            RenewalStatus::Renewed => "renewed",
        }
    }
}

impl fmt::Display for RenewalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RenewalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(RenewalStatus::Active),
            "expiring" => Ok(RenewalStatus::Expiring),
            "expired" => Ok(RenewalStatus::Expired),
            "renewed" => Ok(RenewalStatus::Renewed),
            other => Err(format!("unknown renewal status '{}'", other)),
        }
    }
}

/// Optional per-request values that take precedence over customer defaults
///
/// Field names follow the request payload (`expiryDate`, `reminderDays`).
/// Dates and statuses arrive as raw strings so that malformed values can
/// fall through to defaults instead of failing the request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RenewalOverride {
    pub service: Option<String>,
    pub amount: Option<Decimal>,
    pub expiry_date: Option<String>,
    pub status: Option<String>,
    pub reminder_days: Option<i32>,
    pub notes: Option<String>,
}

/// A fully resolved renewal, not yet persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenewalDraft {
    pub customer_id: CustomerId,
    pub service: String,
    pub amount: Decimal,
    pub expiry_date: NaiveDate,
    pub status: RenewalStatus,
    pub reminder_days: i32,
    pub notes: Option<String>,
}

/// Derives a renewal candidate from a customer and an optional override
///
/// | field         | resolution order                                              |
/// |---------------|---------------------------------------------------------------|
/// | service       | override, recurring service, customer service, `"Service"`    |
/// | amount        | override (>= 0), recurring amount, 0                          |
/// | expiry_date   | override (parsed), `created_at` + one interval                |
/// | status        | override, customer default, classified from days to expiry    |
/// | reminder_days | override, customer default, 30                                |
/// | notes         | override, customer default, none                              |
///
/// An explicit status always wins over classification.
pub fn build_renewal(customer: &Customer, overrides: &RenewalOverride, today: NaiveDate) -> RenewalDraft {
    let service = first_text([
        overrides.service.as_deref(),
        customer.recurring_service.as_deref(),
        customer.service.as_deref(),
    ])
    .unwrap_or_else(|| DEFAULT_SERVICE.to_string());

    let amount = overrides
        .amount
        .filter(|a| !a.is_sign_negative())
        .or(customer.recurring_amount)
        .unwrap_or(Decimal::ZERO);

    let expiry_date = overrides
        .expiry_date
        .as_deref()
        .and_then(to_calendar_date)
        .unwrap_or_else(|| customer.first_cycle_end());

    let status = overrides
        .status
        .as_deref()
        .and_then(|s| s.parse::<RenewalStatus>().ok())
        .or(customer.default_renewal_status)
        .unwrap_or_else(|| RenewalStatus::classify(days_until(expiry_date, today)));

    let reminder_days = overrides
        .reminder_days
        .or(customer.default_renewal_reminder_days)
        .unwrap_or(DEFAULT_REMINDER_DAYS);

    let notes = first_text([
        overrides.notes.as_deref(),
        customer.default_renewal_notes.as_deref(),
    ]);

    RenewalDraft {
        customer_id: customer.id,
        service,
        amount,
        expiry_date,
        status,
        reminder_days,
        notes,
    }
}

/// A persisted renewal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Renewal {
    pub id: RenewalId,
    pub customer_id: CustomerId,
    pub service: String,
    pub amount: Decimal,
    pub expiry_date: NaiveDate,
    pub status: RenewalStatus,
    pub reminder_days: i32,
    pub notes: Option<String>,
    /// Created by the system rather than submitted by a user
    pub auto_generated: bool,
    /// Cycle key for auto-generated renewals, unique per customer
    pub billing_cycle: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Renewal {
    /// A user-submitted renewal
    pub fn from_draft(draft: RenewalDraft, now: DateTime<Utc>) -> Self {
        Self {
            id: RenewalId::new(),
            customer_id: draft.customer_id,
            service: draft.service,
            amount: draft.amount,
            expiry_date: draft.expiry_date,
            status: draft.status,
            reminder_days: draft.reminder_days,
            notes: draft.notes,
            auto_generated: false,
            billing_cycle: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A system-generated renewal for one billing cycle
    pub fn auto_generated(draft: RenewalDraft, billing_cycle: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            auto_generated: true,
            billing_cycle: Some(billing_cycle.into()),
            ..Self::from_draft(draft, now)
        }
    }

    pub fn days_until_expiry(&self, today: NaiveDate) -> i64 {
        days_until(self.expiry_date, today)
    }
}
