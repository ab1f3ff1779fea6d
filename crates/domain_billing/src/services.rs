//! Billing domain services
//!
//! [`AutoGenerationService`] creates auto-generated renewals and invoices
//! while guaranteeing at most one open artifact of each kind per customer.
//!
//! The guard works in three steps:
//!
//! 1. look for an open auto-generated artifact and return it if present
//! 2. derive a candidate for the current billing cycle
//! 3. insert it; the store rejects a second row for the same customer and
//!    cycle, in which case the winning row is read back and returned
//!
//! Step 1 is an optimisation. Step 3 is what makes concurrent callers converge.

use std::sync::Arc;

use chrono::Datelike;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use core_kernel::{Clock, CustomerId, PortError, RenewalId};

use crate::customer::Customer;
use crate::error::BillingError;
use crate::invoice::{build_invoice, Invoice, InvoiceOverride, InvoiceNumber, LineItemInput};
use crate::patch::RenewalPatch;
use crate::ports::{BillingStore, BILLING_CYCLE_KEY, INVOICE_NUMBER_KEY};
use crate::renewal::{build_renewal, Renewal, RenewalOverride, DEFAULT_SERVICE};

/// Attempts at allocating a free invoice number before giving up
pub const DEFAULT_MAX_NUMBER_ATTEMPTS: u32 = 5;

/// Result of an idempotent creation request
#[derive(Debug, Clone, PartialEq)]
pub enum AutoGenerated<T> {
    /// This call created the record
    Created(T),
    /// An open record already existed and was returned unchanged
    Existing(T),
}

impl<T> AutoGenerated<T> {
    pub fn was_created(&self) -> bool {
        matches!(self, AutoGenerated::Created(_))
    }

    pub fn into_inner(self) -> T {
        match self {
            AutoGenerated::Created(value) | AutoGenerated::Existing(value) => value,
        }
    }

    pub fn as_inner(&self) -> &T {
        match self {
            AutoGenerated::Created(value) | AutoGenerated::Existing(value) => value,
        }
    }
}

/// Counts from a bulk generation run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerationReport {
    pub created: usize,
    pub existing: usize,
    pub failed: usize,
}

/// Service creating renewals and invoices on behalf of customers
pub struct AutoGenerationService {
    store: Arc<dyn BillingStore>,
    clock: Arc<dyn Clock>,
    max_number_attempts: u32,
}

impl AutoGenerationService {
    pub fn new(store: Arc<dyn BillingStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            max_number_attempts: DEFAULT_MAX_NUMBER_ATTEMPTS,
        }
    }

    pub fn with_max_number_attempts(mut self, attempts: u32) -> Self {
        self.max_number_attempts = attempts.max(1);
        self
    }

    /// Returns the open auto-generated renewal of a customer, creating one
    /// for the current cycle if there is none
    ///
    /// The expiry of a new renewal is the first cycle end on or after today,
    /// so long-standing customers do not receive renewals that are already
    /// expired.
    ///
    /// # Errors
    ///
    /// - `CustomerNotFound` when the customer does not exist
    /// - `Port` when the store cannot be read; nothing is inserted then
    pub async fn create_auto_renewal_if_absent(
        &self,
        customer_id: CustomerId,
    ) -> Result<AutoGenerated<Renewal>, BillingError> {
        let customer = self.load_customer(customer_id).await?;

        if let Some(existing) = self.store.find_open_auto_renewal(customer_id).await? {
            debug!(%customer_id, renewal_id = %existing.id, "Open auto renewal already exists");
            return Ok(AutoGenerated::Existing(existing));
        }

        let today = self.clock.today();
        let expiry = customer.cycle_end_on_or_after(today);
        let overrides = RenewalOverride {
            expiry_date: Some(expiry.to_string()),
            ..Default::default()
        };
        let draft = build_renewal(&customer, &overrides, today);
        let cycle = customer.interval().cycle_key(expiry);
        let renewal = Renewal::auto_generated(draft, cycle.clone(), self.clock.now());

        match self.store.insert_renewal(&renewal).await {
            Ok(()) => {
                info!(
                    %customer_id,
                    renewal_id = %renewal.id,
                    billing_cycle = %cycle,
                    expiry_date = %renewal.expiry_date,
                    "Auto renewal created"
                );
                Ok(AutoGenerated::Created(renewal))
            }
            Err(e) if e.is_duplicate_of(BILLING_CYCLE_KEY) => {
                debug!(%customer_id, billing_cycle = %cycle, "Lost auto renewal race, reading winner");
                self.store
                    .find_auto_renewal_by_cycle(customer_id, &cycle)
                    .await?
                    .map(AutoGenerated::Existing)
                    .ok_or(BillingError::DuplicateNotVisible {
                        entity: "renewal",
                        customer_id,
                    })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Returns the open (draft) auto-generated invoice of a customer,
    /// creating one for the current cycle if there is none
    ///
    /// The new invoice carries a single line for the recurring service.
    /// Invoice numbers that turn out to be taken are skipped, up to the
    /// configured number of attempts.
    ///
    /// # Errors
    ///
    /// - `CustomerNotFound` when the customer does not exist
    /// - `InvoiceNumberExhausted` when every attempted number was taken
    /// - `Port` when the store cannot be read or written
    pub async fn create_auto_invoice_if_absent(
        &self,
        customer_id: CustomerId,
    ) -> Result<AutoGenerated<Invoice>, BillingError> {
        let customer = self.load_customer(customer_id).await?;

        if let Some(existing) = self.store.find_open_auto_invoice(customer_id).await? {
            debug!(%customer_id, invoice_number = %existing.invoice_number, "Open auto invoice already exists");
            return Ok(AutoGenerated::Existing(existing));
        }

        let today = self.clock.today();
        let draft = build_invoice(&customer, &recurring_invoice_override(&customer), today);
        let cycle = customer.interval().cycle_key(draft.issue_date);

        let prefix = InvoiceNumber::year_prefix(draft.issue_date.year());
        let latest = self.store.latest_invoice_number(&prefix).await?;
        let mut number = InvoiceNumber::next_after(latest.as_deref(), draft.issue_date);

        for attempt in 1..=self.max_number_attempts {
            let invoice = Invoice::from_draft(draft.clone(), number.to_string(), self.clock.now())
                .with_billing_cycle(cycle.clone());

            match self.store.insert_invoice(&invoice).await {
                Ok(()) => {
                    info!(
                        %customer_id,
                        invoice_number = %invoice.invoice_number,
                        billing_cycle = %cycle,
                        total = %invoice.total,
                        "Auto invoice created"
                    );
                    return Ok(AutoGenerated::Created(invoice));
                }
                Err(e) if e.is_duplicate_of(BILLING_CYCLE_KEY) => {
                    debug!(%customer_id, billing_cycle = %cycle, "Lost auto invoice race, reading winner");
                    return self
                        .store
                        .find_auto_invoice_by_cycle(customer_id, &cycle)
                        .await?
                        .map(AutoGenerated::Existing)
                        .ok_or(BillingError::DuplicateNotVisible {
                            entity: "invoice",
                            customer_id,
                        });
                }
                Err(e) if e.is_duplicate_of(INVOICE_NUMBER_KEY) => {
                    warn!(
                        %customer_id,
                        invoice_number = %number,
                        attempt,
                        "Invoice number taken, trying the next one"
                    );
                    number = number.successor();
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(BillingError::InvoiceNumberExhausted {
            attempts: self.max_number_attempts,
        })
    }

    /// Creates a user-submitted renewal from customer defaults and overrides
    pub async fn create_renewal(
        &self,
        customer_id: CustomerId,
        overrides: &RenewalOverride,
    ) -> Result<Renewal, BillingError> {
        let customer = self.load_customer(customer_id).await?;
        let draft = build_renewal(&customer, overrides, self.clock.today());
        let renewal = Renewal::from_draft(draft, self.clock.now());
        self.store.insert_renewal(&renewal).await?;
        info!(%customer_id, renewal_id = %renewal.id, "Renewal created");
        Ok(renewal)
    }

    /// Applies an allow-listed patch to a renewal
    pub async fn update_renewal(&self, id: RenewalId, patch: &RenewalPatch) -> Result<Renewal, BillingError> {
        if patch.is_empty() {
            return Err(BillingError::InvalidPatch("no fields to update".to_string()));
        }
        self.store.update_renewal(id, patch).await.map_err(|e| match e {
            PortError::NotFound { .. } => BillingError::RenewalNotFound(id),
            other => other.into(),
        })
    }

    /// Runs the renewal guard for every recurring customer without an open
    /// auto renewal
    ///
    /// Failures for one customer are logged and counted; the run continues
    /// with the next customer. Failing to list customers aborts the run.
    pub async fn generate_missing_renewals(&self) -> Result<GenerationReport, BillingError> {
        let customers = self.store.customers_missing_auto_renewal().await?;
        let mut report = GenerationReport::default();

        for customer_id in customers {
            match self.create_auto_renewal_if_absent(customer_id).await {
                Ok(AutoGenerated::Created(_)) => report.created += 1,
                Ok(AutoGenerated::Existing(_)) => report.existing += 1,
                Err(e) => {
                    warn!(%customer_id, error = %e, "Auto renewal generation failed");
                    report.failed += 1;
                }
            }
        }

        info!(
            created = report.created,
            existing = report.existing,
            failed = report.failed,
            "Missing renewal generation finished"
        );
        Ok(report)
    }

    async fn load_customer(&self, customer_id: CustomerId) -> Result<Customer, BillingError> {
        self.store.get_customer(customer_id).await.map_err(|e| {
            if e.is_not_found() {
                BillingError::CustomerNotFound(customer_id)
            } else {
                e.into()
            }
        })
    }
}

/// The override describing one cycle of a customer's recurring plan
fn recurring_invoice_override(customer: &Customer) -> InvoiceOverride {
    let description = customer
        .recurring_service
        .as_deref()
        .or(customer.service.as_deref())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_SERVICE);

    InvoiceOverride {
        items: vec![LineItemInput {
            description: Some(format!("{} ({})", description, customer.interval())),
            quantity: Some(Decimal::ONE),
            rate: Some(customer.recurring_amount.unwrap_or(Decimal::ZERO)),
            amount: None,
        }],
        ..Default::default()
    }
}
