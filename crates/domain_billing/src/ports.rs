//! Billing Domain Ports
//!
//! The billing core depends on two collaborators:
//!
//! - **`BillingStore`**: the transactional relational store. The PostgreSQL
//!   adapter lives in `infra_db`.
//! - **`Notifier`**: best-effort outbound messaging. The WhatsApp gateway
//!   adapter lives in `billing_worker`.
//!
//! Both return `PortError`, so services handle failures the same way
//! whichever adapter is plugged in. An in-memory implementation of each is
//! provided in [`mock`] for tests.
//!
//! # Uniqueness contract
//!
//! `insert_renewal` and `insert_invoice` must reject:
//! - a second auto-generated row for the same `(customer_id, billing_cycle)`
//!   with `PortError::Duplicate { key: "billing_cycle", .. }`
//! - an invoice whose number is taken with
//!   `PortError::Duplicate { key: "invoice_number", .. }`
//!
//! `insert_invoice` writes the header and all of its lines atomically.

use async_trait::async_trait;
use chrono::NaiveDate;

use core_kernel::temporal::DateRange;
use core_kernel::{CustomerId, DomainPort, HealthCheckable, PortError, ReminderId, RenewalId};

use crate::customer::Customer;
use crate::invoice::Invoice;
use crate::patch::RenewalPatch;
use crate::reminder::ReminderTarget;
use crate::renewal::Renewal;

/// Uniqueness key for auto-generated artifacts of one customer and cycle
pub const BILLING_CYCLE_KEY: &str = "billing_cycle";

/// Uniqueness key for invoice numbers
pub const INVOICE_NUMBER_KEY: &str = "invoice_number";

/// Persistence port for the billing core
#[async_trait]
pub trait BillingStore: DomainPort + HealthCheckable {
    // ========================================================================
    // Customers
    // ========================================================================

    /// Loads a customer; `PortError::NotFound` when it does not exist
    async fn get_customer(&self, id: CustomerId) -> Result<Customer, PortError>;

    /// Recurring customers that have no open auto-generated renewal
    async fn customers_missing_auto_renewal(&self) -> Result<Vec<CustomerId>, PortError>;

    // ========================================================================
    // Renewals
    // ========================================================================

    /// The open (active or expiring) auto-generated renewal of a customer
    async fn find_open_auto_renewal(&self, customer_id: CustomerId) -> Result<Option<Renewal>, PortError>;

    /// The auto-generated renewal of a customer for one billing cycle
    async fn find_auto_renewal_by_cycle(
        &self,
        customer_id: CustomerId,
        billing_cycle: &str,
    ) -> Result<Option<Renewal>, PortError>;

    async fn insert_renewal(&self, renewal: &Renewal) -> Result<(), PortError>;

    /// Applies an allow-listed patch and returns the updated row
    async fn update_renewal(&self, id: RenewalId, patch: &RenewalPatch) -> Result<Renewal, PortError>;

    // ========================================================================
    // Invoices
    // ========================================================================

    /// The open (draft) auto-generated invoice of a customer
    async fn find_open_auto_invoice(&self, customer_id: CustomerId) -> Result<Option<Invoice>, PortError>;

    async fn find_auto_invoice_by_cycle(
        &self,
        customer_id: CustomerId,
        billing_cycle: &str,
    ) -> Result<Option<Invoice>, PortError>;

    /// Highest invoice number starting with `prefix`, longer numbers first
    /// so that sequence 10000 ranks above 9999
    async fn latest_invoice_number(&self, prefix: &str) -> Result<Option<String>, PortError>;

    /// Inserts header and line items in one transaction
    async fn insert_invoice(&self, invoice: &Invoice) -> Result<(), PortError>;

    // ========================================================================
    // Reminders
    // ========================================================================

    /// Active reminders whose customer has a non-empty destination
    async fn active_reminder_targets(&self) -> Result<Vec<ReminderTarget>, PortError>;

    async fn mark_reminder_sent(&self, id: ReminderId, sent_on: NaiveDate) -> Result<(), PortError>;

    // ========================================================================
    // Bulk status transitions
    // ========================================================================

    /// `expiry_date < today AND status <> expired` becomes expired
    async fn expire_renewals(&self, today: NaiveDate) -> Result<u64, PortError>;

    /// `expiry_date` within `window AND status = active` becomes expiring
    async fn mark_expiring_renewals(&self, window: DateRange) -> Result<u64, PortError>;

    /// `due_date < today AND status = sent` becomes overdue
    async fn mark_overdue_invoices(&self, today: NaiveDate) -> Result<u64, PortError>;
}

/// Outbound message port
///
/// Delivery is best effort. `Ok` means the gateway accepted the message.
#[async_trait]
pub trait Notifier: DomainPort {
    async fn send(&self, destination: &str, text: &str) -> Result<(), PortError>;
}

/// In-memory implementations of the billing ports for testing
///
/// The store honours the same uniqueness contract as the PostgreSQL schema,
/// and can be told to fail reads or to hold concurrent inserts at a barrier
/// so race conditions can be reproduced deterministically.
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use chrono::Utc;
    use tokio::sync::{Barrier, Mutex, RwLock};

    use core_kernel::{AdapterHealth, HealthCheckResult};

    use crate::invoice::InvoiceStatus;
    use crate::reminder::RenewalReminder;
    use crate::renewal::RenewalStatus;

    #[derive(Debug, Default)]
    struct State {
        customers: HashMap<CustomerId, Customer>,
        renewals: Vec<Renewal>,
        invoices: Vec<Invoice>,
        reminders: Vec<RenewalReminder>,
    }

    /// In-memory `BillingStore`
    #[derive(Debug, Default)]
    pub struct MockBillingStore {
        state: Arc<RwLock<State>>,
        unavailable: AtomicBool,
        reject_sent_marks: AtomicBool,
        insert_barrier: Mutex<Option<(Arc<Barrier>, usize)>>,
        inserts_seen: AtomicUsize,
    }

    impl MockBillingStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn add_customer(&self, customer: Customer) {
            self.state.write().await.customers.insert(customer.id, customer);
        }

        pub async fn add_renewal(&self, renewal: Renewal) {
            self.state.write().await.renewals.push(renewal);
        }

        pub async fn add_invoice(&self, invoice: Invoice) {
            self.state.write().await.invoices.push(invoice);
        }

        pub async fn add_reminder(&self, reminder: RenewalReminder) {
            self.state.write().await.reminders.push(reminder);
        }

        pub async fn renewals(&self) -> Vec<Renewal> {
            self.state.read().await.renewals.clone()
        }

        pub async fn invoices(&self) -> Vec<Invoice> {
            self.state.read().await.invoices.clone()
        }

        pub async fn reminders(&self) -> Vec<RenewalReminder> {
            self.state.read().await.reminders.clone()
        }

        /// Makes every subsequent call fail with a connection error
        pub fn set_unavailable(&self, unavailable: bool) {
            self.unavailable.store(unavailable, Ordering::SeqCst);
        }

        /// Makes `mark_reminder_sent` fail while other calls still succeed
        pub fn reject_sent_marks(&self, reject: bool) {
            self.reject_sent_marks.store(reject, Ordering::SeqCst);
        }

        /// Holds the first `parties` inserts until all of them have arrived
        pub async fn hold_inserts_until(&self, parties: usize) {
            *self.insert_barrier.lock().await = Some((Arc::new(Barrier::new(parties)), parties));
        }

        fn check_available(&self) -> Result<(), PortError> {
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(PortError::connection("mock store unavailable"));
            }
            Ok(())
        }

        async fn wait_at_barrier(&self) {
            let seen = self.inserts_seen.fetch_add(1, Ordering::SeqCst);
            let barrier = self.insert_barrier.lock().await.clone();
            if let Some((barrier, parties)) = barrier {
                if seen < parties {
                    barrier.wait().await;
                }
            }
        }
    }

    impl DomainPort for MockBillingStore {}

    #[async_trait]
    impl HealthCheckable for MockBillingStore {
        async fn health_check(&self) -> HealthCheckResult {
            let status = if self.unavailable.load(Ordering::SeqCst) {
                AdapterHealth::Unhealthy
            } else {
                AdapterHealth::Healthy
            };
            HealthCheckResult {
                adapter_id: "mock-billing-store".to_string(),
                status,
                latency_ms: 0,
                message: None,
                checked_at: Utc::now(),
            }
        }
    }

    #[async_trait]
    impl BillingStore for MockBillingStore {
        async fn get_customer(&self, id: CustomerId) -> Result<Customer, PortError> {
            self.check_available()?;
            self.state
                .read()
                .await
                .customers
                .get(&id)
                .cloned()
                .ok_or_else(|| PortError::not_found("Customer", id))
        }

        async fn customers_missing_auto_renewal(&self) -> Result<Vec<CustomerId>, PortError> {
            self.check_available()?;
            let state = self.state.read().await;
            let mut ids: Vec<CustomerId> = state
                .customers
                .values()
                .filter(|c| c.recurring_enabled)
                .filter(|c| {
                    !state
                        .renewals
                        .iter()
                        .any(|r| r.customer_id == c.id && r.auto_generated && r.status.is_open())
                })
                .map(|c| c.id)
                .collect();
            ids.sort();
            Ok(ids)
        }

        async fn find_open_auto_renewal(&self, customer_id: CustomerId) -> Result<Option<Renewal>, PortError> {
            self.check_available()?;
            Ok(self
                .state
                .read()
                .await
                .renewals
                .iter()
                .find(|r| r.customer_id == customer_id && r.auto_generated && r.status.is_open())
                .cloned())
        }

        async fn find_auto_renewal_by_cycle(
            &self,
            customer_id: CustomerId,
            billing_cycle: &str,
        ) -> Result<Option<Renewal>, PortError> {
            self.check_available()?;
            Ok(self
                .state
                .read()
                .await
                .renewals
                .iter()
                .find(|r| {
                    r.customer_id == customer_id
                        && r.auto_generated
                        && r.billing_cycle.as_deref() == Some(billing_cycle)
                })
                .cloned())
        }

        async fn insert_renewal(&self, renewal: &Renewal) -> Result<(), PortError> {
            self.check_available()?;
            self.wait_at_barrier().await;
            let mut state = self.state.write().await;
            let clash = renewal.auto_generated
                && state.renewals.iter().any(|r| {
                    r.customer_id == renewal.customer_id
                        && r.auto_generated
                        && r.billing_cycle == renewal.billing_cycle
                });
            if clash {
                return Err(PortError::duplicate("Renewal", BILLING_CYCLE_KEY));
            }
            state.renewals.push(renewal.clone());
            Ok(())
        }

        async fn update_renewal(&self, id: RenewalId, patch: &RenewalPatch) -> Result<Renewal, PortError> {
            self.check_available()?;
            let mut state = self.state.write().await;
            let renewal = state
                .renewals
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or_else(|| PortError::not_found("Renewal", id))?;
            // stands in for the database's NOW()
            patch.apply_to(renewal, Utc::now());
            Ok(renewal.clone())
        }

        async fn find_open_auto_invoice(&self, customer_id: CustomerId) -> Result<Option<Invoice>, PortError> {
            self.check_available()?;
            Ok(self
                .state
                .read()
                .await
                .invoices
                .iter()
                .find(|i| i.customer_id == customer_id && i.auto_generated && i.status == InvoiceStatus::Draft)
                .cloned())
        }

        async fn find_auto_invoice_by_cycle(
            &self,
            customer_id: CustomerId,
            billing_cycle: &str,
        ) -> Result<Option<Invoice>, PortError> {
            self.check_available()?;
            Ok(self
                .state
                .read()
                .await
                .invoices
                .iter()
                .find(|i| {
                    i.customer_id == customer_id
                        && i.auto_generated
                        && i.billing_cycle.as_deref() == Some(billing_cycle)
                })
                .cloned())
        }

        async fn latest_invoice_number(&self, prefix: &str) -> Result<Option<String>, PortError> {
            self.check_available()?;
            Ok(self
                .state
                .read()
                .await
                .invoices
                .iter()
                .map(|i| i.invoice_number.clone())
                .filter(|n| n.starts_with(prefix))
                .max_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b))))
        }

        async fn insert_invoice(&self, invoice: &Invoice) -> Result<(), PortError> {
            self.check_available()?;
            self.wait_at_barrier().await;
            let mut state = self.state.write().await;
            let cycle_clash = invoice.auto_generated
                && state.invoices.iter().any(|i| {
                    i.customer_id == invoice.customer_id
                        && i.auto_generated
                        && i.billing_cycle == invoice.billing_cycle
                });
            if cycle_clash {
                return Err(PortError::duplicate("Invoice", BILLING_CYCLE_KEY));
            }
            if state.invoices.iter().any(|i| i.invoice_number == invoice.invoice_number) {
                return Err(PortError::duplicate("Invoice", INVOICE_NUMBER_KEY));
            }
            state.invoices.push(invoice.clone());
            Ok(())
        }

        async fn active_reminder_targets(&self) -> Result<Vec<ReminderTarget>, PortError> {
            self.check_available()?;
            let state = self.state.read().await;
            Ok(state
                .reminders
                .iter()
                .filter(|r| r.status == crate::reminder::ReminderStatus::Active)
                .filter_map(|r| {
                    let customer = state.customers.get(&r.customer_id)?;
                    let destination = customer
                        .whatsapp_number
                        .as_deref()
                        .map(str::trim)
                        .filter(|n| !n.is_empty())?;
                    Some(ReminderTarget {
                        reminder: r.clone(),
                        customer_name: customer.name.clone(),
                        destination: destination.to_string(),
                    })
                })
                .collect())
        }

        async fn mark_reminder_sent(&self, id: ReminderId, sent_on: NaiveDate) -> Result<(), PortError> {
            self.check_available()?;
            if self.reject_sent_marks.load(Ordering::SeqCst) {
                return Err(PortError::connection("mock store rejected write"));
            }
            let mut state = self.state.write().await;
            let reminder = state
                .reminders
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or_else(|| PortError::not_found("RenewalReminder", id))?;
            reminder.last_reminder_sent = Some(sent_on);
            Ok(())
        }

        async fn expire_renewals(&self, today: NaiveDate) -> Result<u64, PortError> {
            self.check_available()?;
            let mut count = 0;
            for r in self.state.write().await.renewals.iter_mut() {
                if r.expiry_date < today && r.status != RenewalStatus::Expired {
                    r.status = RenewalStatus::Expired;
                    count += 1;
                }
            }
            Ok(count)
        }

        async fn mark_expiring_renewals(&self, window: DateRange) -> Result<u64, PortError> {
            self.check_available()?;
            let mut count = 0;
            for r in self.state.write().await.renewals.iter_mut() {
                if window.contains(r.expiry_date) && r.status == RenewalStatus::Active {
                    r.status = RenewalStatus::Expiring;
                    count += 1;
                }
            }
            Ok(count)
        }

        async fn mark_overdue_invoices(&self, today: NaiveDate) -> Result<u64, PortError> {
            self.check_available()?;
            let mut count = 0;
            for i in self.state.write().await.invoices.iter_mut() {
                if i.is_past_due(today) {
                    i.status = InvoiceStatus::Overdue;
                    count += 1;
                }
            }
            Ok(count)
        }
    }

    /// A notifier that records messages instead of sending them
    #[derive(Debug, Default)]
    pub struct RecordingNotifier {
        sent: Mutex<Vec<(String, String)>>,
        failing_destinations: std::sync::RwLock<Vec<String>>,
        delay: Option<Duration>,
    }

    impl RecordingNotifier {
        pub fn new() -> Self {
            Self::default()
        }

        /// Every send waits this long before succeeding
        pub fn with_delay(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::default()
            }
        }

        /// Sends to `destination` fail with a service-unavailable error
        pub fn fail_for(&self, destination: impl Into<String>) {
            if let Ok(mut failing) = self.failing_destinations.write() {
                failing.push(destination.into());
            }
        }

        pub async fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().await.clone()
        }
    }

    impl DomainPort for RecordingNotifier {}

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, destination: &str, text: &str) -> Result<(), PortError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let failing = self
                .failing_destinations
                .read()
                .map(|f| f.iter().any(|d| d == destination))
                .unwrap_or(false);
            if failing {
                return Err(PortError::ServiceUnavailable {
                    service: "whatsapp".to_string(),
                });
            }
            self.sent.lock().await.push((destination.to_string(), text.to_string()));
            Ok(())
        }
    }
}
