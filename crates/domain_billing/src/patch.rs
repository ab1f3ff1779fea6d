//! Allow-listed renewal updates
//!
//! Update requests arrive as JSON objects keyed by request field names.
//! Each key is looked up in a fixed table that maps it to a known column;
//! keys outside the table are rejected. Column names therefore never come
//! from the caller.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::str::FromStr;

use core_kernel::to_calendar_date;

use crate::error::BillingError;
use crate::renewal::{Renewal, RenewalStatus};

/// A renewal column that may be updated
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RenewalField {
    Service,
    Amount,
    ExpiryDate,
    Status,
    ReminderDays,
    Notes,
}

/// Request key to field. Both camelCase and snake_case keys are accepted.
const RENEWAL_FIELD_MAP: &[(&str, RenewalField)] = &[
    ("service", RenewalField::Service),
    ("amount", RenewalField::Amount),
    ("expiryDate", RenewalField::ExpiryDate),
    ("expiry_date", RenewalField::ExpiryDate),
    ("status", RenewalField::Status),
    ("reminderDays", RenewalField::ReminderDays),
    ("reminder_days", RenewalField::ReminderDays),
    ("notes", RenewalField::Notes),
];

impl RenewalField {
    pub fn from_request_key(key: &str) -> Option<Self> {
        RENEWAL_FIELD_MAP
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, field)| *field)
    }

    /// The database column this field is stored in
    pub fn column(&self) -> &'static str {
        match self {
            RenewalField::Service => "service",
            RenewalField::Amount => "amount",
            RenewalField::ExpiryDate => "expiry_date",
            RenewalField::Status => "status",
            RenewalField::ReminderDays => "reminder_days",
            RenewalField::Notes => "notes",
        }
    }

    /// Whether `value` has the shape this field is stored as
    pub fn accepts(&self, value: &PatchValue) -> bool {
        matches!(
            (self, value),
            (RenewalField::Service, PatchValue::Text(_))
                | (RenewalField::Amount, PatchValue::Amount(_))
                | (RenewalField::ExpiryDate, PatchValue::Date(_))
                | (RenewalField::Status, PatchValue::Status(_))
                | (RenewalField::ReminderDays, PatchValue::Days(_))
                | (RenewalField::Notes, PatchValue::OptionalText(_))
        )
    }
}

/// A typed new value for one field
#[derive(Debug, Clone, PartialEq)]
pub enum PatchValue {
    Text(String),
    OptionalText(Option<String>),
    Amount(Decimal),
    Date(NaiveDate),
    Status(RenewalStatus),
    Days(i32),
}

/// A validated set of renewal changes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenewalPatch {
    changes: BTreeMap<RenewalField, PatchValue>,
}

impl RenewalPatch {
    /// Validates a request body against the allow-list
    ///
    /// # Errors
    ///
    /// Returns `BillingError::InvalidPatch` for unknown keys and for values
    /// of the wrong shape.
    pub fn from_request(body: &Map<String, Value>) -> Result<Self, BillingError> {
        let mut patch = Self::default();
        for (key, value) in body {
            let field = RenewalField::from_request_key(key)
                .ok_or_else(|| BillingError::InvalidPatch(format!("unknown field '{}'", key)))?;
            let parsed = parse_value(field, value)
                .ok_or_else(|| BillingError::InvalidPatch(format!("invalid value for '{}'", key)))?;
            patch.changes.insert(field, parsed);
        }
        Ok(patch)
    }

    /// Adds one change
    ///
    /// # Errors
    ///
    /// Returns `BillingError::InvalidPatch` when the value does not match the
    /// field, e.g. a day count for `service`.
    pub fn set(mut self, field: RenewalField, value: PatchValue) -> Result<Self, BillingError> {
        if !field.accepts(&value) {
            return Err(BillingError::InvalidPatch(format!(
                "{:?} cannot hold {:?}",
                field, value
            )));
        }
        self.changes.insert(field, value);
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RenewalField, &PatchValue)> {
        self.changes.iter()
    }

    /// Applies the changes in memory, stamping `updated_at` with `now`
    pub fn apply_to(&self, renewal: &mut Renewal, now: DateTime<Utc>) {
        for (field, value) in &self.changes {
            match (field, value) {
                (RenewalField::Service, PatchValue::Text(s)) => renewal.service = s.clone(),
                (RenewalField::Amount, PatchValue::Amount(a)) => renewal.amount = *a,
                (RenewalField::ExpiryDate, PatchValue::Date(d)) => renewal.expiry_date = *d,
                (RenewalField::Status, PatchValue::Status(s)) => renewal.status = *s,
                (RenewalField::ReminderDays, PatchValue::Days(n)) => renewal.reminder_days = *n,
                (RenewalField::Notes, PatchValue::OptionalText(n)) => renewal.notes = n.clone(),
                // pairs are checked when inserted
                _ => {}
            }
        }
        renewal.updated_at = now;
    }
}

fn parse_value(field: RenewalField, value: &Value) -> Option<PatchValue> {
    match field {
        RenewalField::Service => value
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| PatchValue::Text(s.to_string())),
        RenewalField::Amount => {
            let amount = match value {
                Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
                Value::String(s) => Decimal::from_str(s.trim()).ok(),
                _ => None,
            }?;
            (!amount.is_sign_negative()).then_some(PatchValue::Amount(amount))
        }
        RenewalField::ExpiryDate => value.as_str().and_then(to_calendar_date).map(PatchValue::Date),
        RenewalField::Status => value
            .as_str()
            .and_then(|s| s.parse::<RenewalStatus>().ok())
            .map(PatchValue::Status),
        RenewalField::ReminderDays => value
            .as_i64()
            .and_then(|n| i32::try_from(n).ok())
            .filter(|n| *n >= 0)
            .map(PatchValue::Days),
        RenewalField::Notes => match value {
            Value::Null => Some(PatchValue::OptionalText(None)),
            Value::String(s) if s.trim().is_empty() => Some(PatchValue::OptionalText(None)),
            Value::String(s) => Some(PatchValue::OptionalText(Some(s.clone()))),
            _ => None,
        },
    }
}
