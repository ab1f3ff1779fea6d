//! Test Data Builders
//!
//! Provides builder patterns for constructing billing records with sensible
//! defaults. Tests specify only the fields they care about.

use chrono::{NaiveDate, Utc};
use fake::faker::name::en::Name;
use fake::Fake;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use core_kernel::CustomerId;
use domain_billing::{
    Customer, Invoice, InvoiceDraft, InvoiceLine, InvoiceStatus, RecurringInterval, RenewalDraft,
    RenewalReminder, RenewalStatus, ReminderStatus, Renewal, ServiceType,
};

use crate::fixtures::DateFixtures;

/// Builder for customers
pub struct CustomerBuilder {
    customer: Customer,
}

impl Default for CustomerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CustomerBuilder {
    /// A customer with a random name, created on 2024-01-01, no plan
    pub fn new() -> Self {
        let name: String = Name().fake();
        Self {
            customer: Customer::new(name, DateFixtures::date(2024, 1, 1)),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.customer.name = name.into();
        self
    }

    pub fn created_on(mut self, date: NaiveDate) -> Self {
        self.customer.created_at = date;
        self
    }

    pub fn with_whatsapp(mut self, number: impl Into<String>) -> Self {
        self.customer.whatsapp_number = Some(number.into());
        self
    }

    /// Enables a recurring plan
    pub fn recurring(mut self, interval: RecurringInterval, amount: Decimal) -> Self {
        self.customer.recurring_enabled = true;
        self.customer.recurring_interval = Some(interval);
        self.customer.recurring_amount = Some(amount);
        self
    }

    pub fn with_recurring_service(mut self, service: impl Into<String>) -> Self {
        self.customer.recurring_service = Some(service.into());
        self
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.customer.service = Some(service.into());
        self
    }

    pub fn with_tax_rate(mut self, rate: Decimal) -> Self {
        self.customer.default_tax_rate = Some(rate);
        self
    }

    pub fn with_due_days(mut self, days: i32) -> Self {
        self.customer.default_due_days = Some(days);
        self
    }

    pub fn with_renewal_defaults(
        mut self,
        status: Option<RenewalStatus>,
        reminder_days: Option<i32>,
        notes: Option<&str>,
    ) -> Self {
        self.customer.default_renewal_status = status;
        self.customer.default_renewal_reminder_days = reminder_days;
        self.customer.default_renewal_notes = notes.map(str::to_string);
        self
    }

    pub fn with_invoice_notes(mut self, notes: impl Into<String>) -> Self {
        self.customer.default_invoice_notes = Some(notes.into());
        self
    }

    pub fn build(self) -> Customer {
        self.customer
    }
}

/// Builder for persisted renewals
pub struct RenewalBuilder {
    draft: RenewalDraft,
    billing_cycle: Option<String>,
}

impl RenewalBuilder {
    pub fn for_customer(customer_id: CustomerId) -> Self {
        Self {
            draft: RenewalDraft {
                customer_id,
                service: "Web Hosting".to_string(),
                amount: dec!(1000),
                expiry_date: DateFixtures::today(),
                status: RenewalStatus::Active,
                reminder_days: 30,
                notes: None,
            },
            billing_cycle: None,
        }
    }

    pub fn expiring_on(mut self, date: NaiveDate) -> Self {
        self.draft.expiry_date = date;
        self
    }

    pub fn with_status(mut self, status: RenewalStatus) -> Self {
        self.draft.status = status;
        self
    }

    /// Marks the renewal as auto-generated for `cycle`
    pub fn auto_generated(mut self, cycle: impl Into<String>) -> Self {
        self.billing_cycle = Some(cycle.into());
        self
    }

    pub fn build(self) -> Renewal {
        match self.billing_cycle {
            Some(cycle) => Renewal::auto_generated(self.draft, cycle, Utc::now()),
            None => Renewal::from_draft(self.draft, Utc::now()),
        }
    }
}

/// Builder for persisted invoices
pub struct InvoiceBuilder {
    draft: InvoiceDraft,
    number: String,
    billing_cycle: Option<String>,
}

impl InvoiceBuilder {
    pub fn for_customer(customer_id: CustomerId) -> Self {
        let issue_date = DateFixtures::today();
        Self {
            draft: InvoiceDraft {
                customer_id,
                amount: dec!(1000),
                tax: dec!(18),
                total: dec!(1180.00),
                issue_date,
                due_date: issue_date,
                status: InvoiceStatus::Draft,
                notes: None,
                items: vec![InvoiceLine::new("Web Hosting", Decimal::ONE, dec!(1000))],
            },
            number: "INV-2024-0001".to_string(),
            billing_cycle: None,
        }
    }

    pub fn numbered(mut self, number: impl Into<String>) -> Self {
        self.number = number.into();
        self
    }

    pub fn with_status(mut self, status: InvoiceStatus) -> Self {
        self.draft.status = status;
        self
    }

    pub fn due_on(mut self, date: NaiveDate) -> Self {
        self.draft.due_date = date;
        self
    }

    pub fn auto_generated(mut self, cycle: impl Into<String>) -> Self {
        self.billing_cycle = Some(cycle.into());
        self
    }

    pub fn build(self) -> Invoice {
        let invoice = Invoice::from_draft(self.draft, self.number, Utc::now());
        match self.billing_cycle {
            Some(cycle) => invoice.with_billing_cycle(cycle),
            None => invoice,
        }
    }
}

/// Builder for renewal reminders
pub struct ReminderBuilder {
    reminder: RenewalReminder,
}

impl ReminderBuilder {
    /// A domain reminder with offsets 30, 7 and 1
    pub fn for_customer(customer_id: CustomerId, expiry_date: NaiveDate) -> Self {
        Self {
            reminder: RenewalReminder::new(customer_id, ServiceType::Domain, "acme.in", expiry_date, [30, 7, 1]),
        }
    }

    pub fn with_offsets(mut self, offsets: impl IntoIterator<Item = i32>) -> Self {
        self.reminder.reminder_days = offsets.into_iter().collect();
        self
    }

    pub fn last_sent_on(mut self, date: NaiveDate) -> Self {
        self.reminder.last_reminder_sent = Some(date);
        self
    }

    pub fn with_status(mut self, status: ReminderStatus) -> Self {
        self.reminder.status = status;
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.reminder.whatsapp_template = template.into();
        self
    }

    pub fn for_service(mut self, service_type: ServiceType, name: impl Into<String>) -> Self {
        self.reminder.service_type = service_type;
        self.reminder.service_name = name.into();
        self
    }

    pub fn build(self) -> RenewalReminder {
        self.reminder
    }
}
