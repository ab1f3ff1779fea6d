//! Renewal reminders
//!
//! A reminder carries a set of day-offsets before expiry (for example
//! 30, 7 and 1 days). On a day whose distance to expiry is one of those
//! offsets the reminder is due, unless it already went out that day.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use core_kernel::{days_until, CustomerId, ReminderId};

/// Template used when a reminder has none of its own
pub const DEFAULT_TEMPLATE: &str = "Hello {customerName}, your {serviceName} is due for renewal on {expiryDate}. Please contact us to renew and avoid any interruption.";

/// Reminder lifecycle status
///
/// Only `Active` reminders are dispatched. The other states are terminal
/// and are set outside the dispatch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderStatus {
    Active,
    Renewed,
    Expired,
    Cancelled,
}

impl ReminderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderStatus::Active => "active",
            ReminderStatus::Renewed => "renewed",
            ReminderStatus::Expired => "expired",
            ReminderStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for ReminderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(ReminderStatus::Active),
            "renewed" => Ok(ReminderStatus::Renewed),
            "expired" => Ok(ReminderStatus::Expired),
            "cancelled" | "canceled" => Ok(ReminderStatus::Cancelled),
            other => Err(format!("unknown reminder status '{}'", other)),
        }
    }
}

/// Kind of service a reminder is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    Domain,
    Hosting,
    Ssl,
    Maintenance,
    Subscription,
    Other,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Domain => "domain",
            ServiceType::Hosting => "hosting",
            ServiceType::Ssl => "ssl",
            ServiceType::Maintenance => "maintenance",
            ServiceType::Subscription => "subscription",
            ServiceType::Other => "other",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceType {
    type Err = String;

    /// Unknown service types map to `Other`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "domain" => ServiceType::Domain,
            "hosting" => ServiceType::Hosting,
            "ssl" => ServiceType::Ssl,
            "maintenance" => ServiceType::Maintenance,
            "subscription" => ServiceType::Subscription,
            _ => ServiceType::Other,
        })
    }
}

/// A renewal reminder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenewalReminder {
    pub id: ReminderId,
    pub customer_id: CustomerId,
    pub service_type: ServiceType,
    pub service_name: String,
    pub expiry_date: NaiveDate,
    /// Day-offsets before expiry at which to notify
    pub reminder_days: BTreeSet<i32>,
    pub last_reminder_sent: Option<NaiveDate>,
    pub status: ReminderStatus,
    pub whatsapp_template: String,
}

/// Outcome of checking one reminder against today
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderDecision {
    Due { days_until_expiry: i64 },
    NotAnOffset { days_until_expiry: i64 },
    AlreadySentToday,
    Inactive,
}

impl RenewalReminder {
    pub fn new(
        customer_id: CustomerId,
        service_type: ServiceType,
        service_name: impl Into<String>,
        expiry_date: NaiveDate,
        reminder_days: impl IntoIterator<Item = i32>,
    ) -> Self {
        Self {
            id: ReminderId::new(),
            customer_id,
            service_type,
            service_name: service_name.into(),
            expiry_date,
            reminder_days: reminder_days.into_iter().collect(),
            last_reminder_sent: None,
            status: ReminderStatus::Active,
            whatsapp_template: DEFAULT_TEMPLATE.to_string(),
        }
    }

    /// Decides whether the reminder should be sent today
    ///
    /// Offsets are matched against a single `today`, so however many offsets
    /// a reminder has, it is due at most once per calendar day.
    pub fn decide(&self, today: NaiveDate) -> ReminderDecision {
        if self.status != ReminderStatus::Active {
            return ReminderDecision::Inactive;
        }

        let days_until_expiry = days_until(self.expiry_date, today);
        let matches_offset = i32::try_from(days_until_expiry)
            .map(|days| self.reminder_days.contains(&days))
            .unwrap_or(false);

        if !matches_offset {
            ReminderDecision::NotAnOffset { days_until_expiry }
        } else if self.last_reminder_sent == Some(today) {
            ReminderDecision::AlreadySentToday
        } else {
            ReminderDecision::Due { days_until_expiry }
        }
    }

    /// Renders this reminder's template, falling back to the default one
    pub fn render(&self, customer_name: &str) -> String {
        let template = if self.whatsapp_template.trim().is_empty() {
            DEFAULT_TEMPLATE
        } else {
            self.whatsapp_template.as_str()
        };
        render_template(template, customer_name, &self.service_name, self.expiry_date)
    }
}

/// An active reminder joined with the customer data needed to send it
#[derive(Debug, Clone, PartialEq)]
pub struct ReminderTarget {
    pub reminder: RenewalReminder,
    pub customer_name: String,
    /// WhatsApp number the message goes to
    pub destination: String,
}

/// Human form of an expiry date, e.g. `05 Mar 2024`
pub fn format_expiry(date: NaiveDate) -> String {
    date.format("%d %b %Y").to_string()
}

/// Substitutes `{customerName}`, `{serviceName}` and `{expiryDate}`
pub fn render_template(template: &str, customer_name: &str, service_name: &str, expiry_date: NaiveDate) -> String {
    template
        .replace("{customerName}", customer_name)
        .replace("{serviceName}", service_name)
        .replace("{expiryDate}", &format_expiry(expiry_date))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn reminder(expiry: NaiveDate) -> RenewalReminder {
        RenewalReminder::new(CustomerId::new(), ServiceType::Domain, "acme.in", expiry, [30, 7, 1])
    }

    #[test]
    fn test_due_on_matching_offset() {
        let r = reminder(d(2024, 3, 8));
        assert_eq!(r.decide(d(2024, 3, 1)), ReminderDecision::Due { days_until_expiry: 7 });
        assert_eq!(r.decide(d(2024, 3, 2)), ReminderDecision::NotAnOffset { days_until_expiry: 6 });
    }

    #[test]
    fn test_not_resent_same_day() {
        let mut r = reminder(d(2024, 3, 8));
        r.last_reminder_sent = Some(d(2024, 3, 1));
        assert_eq!(r.decide(d(2024, 3, 1)), ReminderDecision::AlreadySentToday);
        assert_eq!(r.decide(d(2024, 3, 7)), ReminderDecision::Due { days_until_expiry: 1 });
    }

    #[test]
    fn test_inactive_never_due() {
        let mut r = reminder(d(2024, 3, 8));
        r.status = ReminderStatus::Cancelled;
        assert_eq!(r.decide(d(2024, 3, 1)), ReminderDecision::Inactive);
    }

    #[test]
    fn test_render_all_placeholders() {
        let text = render_template(
            "Hi {customerName}: {serviceName} ends {expiryDate}. {serviceName}!",
            "Priya",
            "acme.in",
            d(2024, 3, 5),
        );
        assert_eq!(text, "Hi Priya: acme.in ends 05 Mar 2024. acme.in!");
    }

    #[test]
    fn test_blank_template_uses_default() {
        let mut r = reminder(d(2024, 3, 5));
        r.whatsapp_template = "  ".to_string();
        let text = r.render("Priya");
        assert!(text.starts_with("Hello Priya, your acme.in"));
        assert!(text.contains("05 Mar 2024"));
    }

    #[test]
    fn test_unknown_service_type_is_other() {
        assert_eq!("VPS".parse::<ServiceType>(), Ok(ServiceType::Other));
        assert_eq!("SSL".parse::<ServiceType>(), Ok(ServiceType::Ssl));
    }
}
