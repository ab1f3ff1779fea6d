//! Billing Automation Domain
//!
//! This crate derives recurring billing artifacts for CRM customers and keeps
//! them moving through their lifecycle:
//!
//! - **Derivation**: renewals and invoices are resolved field by field from a
//!   per-request override, then the customer's stored defaults, then fixed
//!   fallbacks. Derivation is pure; "today" is always passed in.
//! - **Idempotent auto-generation**: at most one open auto-generated renewal
//!   or invoice exists per customer. Concurrent requests converge on the same
//!   record through a per-customer, per-cycle unique key in the store.
//! - **Reminder dispatch**: active renewal reminders whose day-offset matches
//!   today are rendered and sent at most once per calendar day.
//! - **Status sweep**: renewals move active -> expiring -> expired and sent
//!   invoices move to overdue as their dates pass.
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_billing::{build_renewal, RenewalOverride};
//!
//! let draft = build_renewal(&customer, &RenewalOverride::default(), today);
//! assert_eq!(draft.expiry_date, add_months(customer.created_at, 1));
//! ```

pub mod customer;
pub mod renewal;
pub mod invoice;
pub mod reminder;
pub mod patch;
pub mod ports;
pub mod services;
pub mod sweeps;
pub mod scheduler;
pub mod error;

pub use customer::{Customer, RecurringInterval};
pub use renewal::{build_renewal, Renewal, RenewalDraft, RenewalOverride, RenewalStatus};
pub use invoice::{
    build_invoice, compute_total, Invoice, InvoiceDraft, InvoiceLine, InvoiceNumber,
    InvoiceOverride, InvoiceStatus, LineItemInput,
};
pub use reminder::{
    render_template, ReminderDecision, ReminderStatus, ReminderTarget, RenewalReminder,
    ServiceType,
};
pub use patch::{PatchValue, RenewalField, RenewalPatch};
pub use ports::{BillingStore, Notifier};
pub use services::{AutoGenerated, AutoGenerationService, GenerationReport};
pub use sweeps::{ReminderDispatcher, ReminderSweepReport, StatusSweepReport, StatusSweeper};
pub use scheduler::{BillingScheduler, SchedulerConfig};
pub use error::BillingError;
#[cfg(any(test, feature = "mock"))]
pub use ports::mock::{MockBillingStore, RecordingNotifier};
