//! PostgreSQL Billing Adapter
//!
//! Implements `BillingStore` on top of `BillingRepository`. Rows are
//! converted to domain types here; a stored status that no longer parses is
//! reported as a transformation error rather than silently defaulted.
//!
//! Unique violations are reported under the domain's uniqueness keys:
//!
//! | constraint                    | key              |
//! |-------------------------------|------------------|
//! | `renewals_auto_cycle_key`     | `billing_cycle`  |
//! | `invoices_auto_cycle_key`     | `billing_cycle`  |
//! | `invoices_invoice_number_key` | `invoice_number` |

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::PgPool;
use tracing::{debug, instrument};

use core_kernel::temporal::DateRange;
use core_kernel::{
    AdapterHealth, CustomerId, DomainPort, HealthCheckResult, HealthCheckable, InvoiceId, InvoiceItemId,
    PortError, ReminderId, RenewalId,
};
use domain_billing::ports::{BILLING_CYCLE_KEY, INVOICE_NUMBER_KEY};
use domain_billing::{
    BillingStore, Customer, Invoice, InvoiceLine, RecurringInterval, ReminderTarget, Renewal, RenewalPatch,
    RenewalReminder,
};

use crate::error::DatabaseError;
use crate::repositories::billing::{
    BillingRepository, CustomerRow, InvoiceItemRow, InvoiceRow, InvoiceWithItems, ReminderTargetRow, RenewalRow,
    INVOICE_CYCLE_CONSTRAINT, INVOICE_NUMBER_CONSTRAINT, RENEWAL_CYCLE_CONSTRAINT,
};

const ADAPTER_ID: &str = "postgres-billing-adapter";
/// A `SELECT 1` slower than this marks the store degraded
const SLOW_PROBE_MS: u64 = 1_000;

/// PostgreSQL-backed implementation of `BillingStore`
#[derive(Debug, Clone)]
pub struct PostgresBillingAdapter {
    repository: BillingRepository,
    pool: PgPool,
}

impl PostgresBillingAdapter {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: BillingRepository::new(pool.clone()),
            pool,
        }
    }

    /// Returns the underlying repository for operations outside the port
    pub fn repository(&self) -> &BillingRepository {
        &self.repository
    }
}

impl DomainPort for PostgresBillingAdapter {}

#[async_trait]
impl HealthCheckable for PostgresBillingAdapter {
    async fn health_check(&self) -> HealthCheckResult {
        let start = std::time::Instant::now();

        let result = sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await;

        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(_) if latency_ms > SLOW_PROBE_MS => HealthCheckResult {
                adapter_id: ADAPTER_ID.to_string(),
                status: AdapterHealth::Degraded,
                latency_ms,
                message: Some(format!("Probe took {}ms", latency_ms)),
                checked_at: Utc::now(),
            },
            Ok(_) => HealthCheckResult {
                adapter_id: ADAPTER_ID.to_string(),
                status: AdapterHealth::Healthy,
                latency_ms,
                message: None,
                checked_at: Utc::now(),
            },
            Err(e) => HealthCheckResult {
                adapter_id: ADAPTER_ID.to_string(),
                status: AdapterHealth::Unhealthy,
                latency_ms,
                message: Some(format!("Database error: {}", e)),
                checked_at: Utc::now(),
            },
        }
    }
}

#[async_trait]
impl BillingStore for PostgresBillingAdapter {
    #[instrument(skip(self), fields(customer_id = %id))]
    async fn get_customer(&self, id: CustomerId) -> Result<Customer, PortError> {
        let row = self.repository.get_customer(*id.as_uuid()).await.map_err(db_to_port_error)?;
        customer_from_row(row).map_err(db_to_port_error)
    }

    #[instrument(skip(self))]
    async fn customers_missing_auto_renewal(&self) -> Result<Vec<CustomerId>, PortError> {
        let ids = self
            .repository
            .customers_missing_auto_renewal()
            .await
            .map_err(db_to_port_error)?;
        debug!(count = ids.len(), "Recurring customers without an open auto renewal");
        Ok(ids.into_iter().map(CustomerId::from_uuid).collect())
    }

    #[instrument(skip(self), fields(customer_id = %customer_id))]
    async fn find_open_auto_renewal(&self, customer_id: CustomerId) -> Result<Option<Renewal>, PortError> {
        self.repository
            .find_open_auto_renewal(*customer_id.as_uuid())
            .await
            .and_then(|row| row.map(renewal_from_row).transpose())
            .map_err(db_to_port_error)
    }

    #[instrument(skip(self), fields(customer_id = %customer_id))]
    async fn find_auto_renewal_by_cycle(
        &self,
        customer_id: CustomerId,
        billing_cycle: &str,
    ) -> Result<Option<Renewal>, PortError> {
        self.repository
            .find_auto_renewal_by_cycle(*customer_id.as_uuid(), billing_cycle)
            .await
            .and_then(|row| row.map(renewal_from_row).transpose())
            .map_err(db_to_port_error)
    }

    #[instrument(skip(self, renewal), fields(renewal_id = %renewal.id, customer_id = %renewal.customer_id))]
    async fn insert_renewal(&self, renewal: &Renewal) -> Result<(), PortError> {
        self.repository
            .insert_renewal(&renewal_to_row(renewal))
            .await
            .map_err(db_to_port_error)
    }

    #[instrument(skip(self, patch), fields(renewal_id = %id))]
    async fn update_renewal(&self, id: RenewalId, patch: &RenewalPatch) -> Result<Renewal, PortError> {
        self.repository
            .update_renewal(*id.as_uuid(), patch)
            .await
            .and_then(renewal_from_row)
            .map_err(db_to_port_error)
    }

    #[instrument(skip(self), fields(customer_id = %customer_id))]
    async fn find_open_auto_invoice(&self, customer_id: CustomerId) -> Result<Option<Invoice>, PortError> {
        self.repository
            .find_open_auto_invoice(*customer_id.as_uuid())
            .await
            .and_then(|found| found.map(invoice_from_rows).transpose())
            .map_err(db_to_port_error)
    }

    #[instrument(skip(self), fields(customer_id = %customer_id))]
    async fn find_auto_invoice_by_cycle(
        &self,
        customer_id: CustomerId,
        billing_cycle: &str,
    ) -> Result<Option<Invoice>, PortError> {
        self.repository
            .find_auto_invoice_by_cycle(*customer_id.as_uuid(), billing_cycle)
            .await
            .and_then(|found| found.map(invoice_from_rows).transpose())
            .map_err(db_to_port_error)
    }

    #[instrument(skip(self))]
    async fn latest_invoice_number(&self, prefix: &str) -> Result<Option<String>, PortError> {
        self.repository
            .latest_invoice_number(prefix)
            .await
            .map_err(db_to_port_error)
    }

    #[instrument(skip(self, invoice), fields(invoice_number = %invoice.invoice_number, customer_id = %invoice.customer_id))]
    async fn insert_invoice(&self, invoice: &Invoice) -> Result<(), PortError> {
        let (header, items) = invoice_to_rows(invoice);
        self.repository
            .insert_invoice(&header, &items)
            .await
            .map_err(db_to_port_error)
    }

    #[instrument(skip(self))]
    async fn active_reminder_targets(&self) -> Result<Vec<ReminderTarget>, PortError> {
        let rows = self
            .repository
            .active_reminder_targets()
            .await
            .map_err(db_to_port_error)?;
        rows.into_iter()
            .map(reminder_target_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_to_port_error)
    }

    #[instrument(skip(self), fields(reminder_id = %id))]
    async fn mark_reminder_sent(&self, id: ReminderId, sent_on: NaiveDate) -> Result<(), PortError> {
        self.repository
            .mark_reminder_sent(*id.as_uuid(), sent_on)
            .await
            .map_err(db_to_port_error)
    }

    #[instrument(skip(self))]
    async fn expire_renewals(&self, today: NaiveDate) -> Result<u64, PortError> {
        self.repository.expire_renewals(today).await.map_err(db_to_port_error)
    }

    #[instrument(skip(self), fields(start = %window.start, end = %window.end))]
    async fn mark_expiring_renewals(&self, window: DateRange) -> Result<u64, PortError> {
        self.repository
            .mark_expiring_renewals(window.start, window.end)
            .await
            .map_err(db_to_port_error)
    }

    #[instrument(skip(self))]
    async fn mark_overdue_invoices(&self, today: NaiveDate) -> Result<u64, PortError> {
        self.repository.mark_overdue_invoices(today).await.map_err(db_to_port_error)
    }
}

/// Translates database errors, naming unique violations by domain key
fn db_to_port_error(error: DatabaseError) -> PortError {
    let key = match error.violated_constraint() {
        Some(RENEWAL_CYCLE_CONSTRAINT) | Some(INVOICE_CYCLE_CONSTRAINT) => Some(BILLING_CYCLE_KEY),
        Some(INVOICE_NUMBER_CONSTRAINT) => Some(INVOICE_NUMBER_KEY),
        _ => None,
    };
    match key {
        Some(key) => PortError::duplicate(entity_for_constraint(&error), key),
        None => error.into(),
    }
}

fn entity_for_constraint(error: &DatabaseError) -> &'static str {
    match error.violated_constraint() {
        Some(RENEWAL_CYCLE_CONSTRAINT) => "Renewal",
        _ => "Invoice",
    }
}

// ============================================================================
// Row conversions
// ============================================================================

fn parse_column<T: std::str::FromStr>(column: &str, value: &str) -> Result<T, DatabaseError> {
    value.parse::<T>().map_err(|_| DatabaseError::invalid_data(column, value))
}

fn customer_from_row(row: CustomerRow) -> Result<Customer, DatabaseError> {
    let recurring_interval = row
        .recurring_interval
        .as_deref()
        .map(|v| parse_column::<RecurringInterval>("customers.recurring_interval", v))
        .transpose()?;
    let default_renewal_status = row
        .default_renewal_status
        .as_deref()
        .map(|v| parse_column("customers.default_renewal_status", v))
        .transpose()?;

    Ok(Customer {
        id: CustomerId::from_uuid(row.id),
        name: row.name,
        whatsapp_number: row.whatsapp_number,
        service: row.service,
        recurring_enabled: row.recurring_enabled,
        recurring_interval,
        recurring_amount: row.recurring_amount,
        recurring_service: row.recurring_service,
        default_renewal_status,
        default_renewal_reminder_days: row.default_renewal_reminder_days,
        default_renewal_notes: row.default_renewal_notes,
        default_tax_rate: row.default_tax_rate,
        default_due_days: row.default_due_days,
        default_invoice_notes: row.default_invoice_notes,
        created_at: row.created_at,
    })
}

fn renewal_from_row(row: RenewalRow) -> Result<Renewal, DatabaseError> {
    Ok(Renewal {
        id: RenewalId::from_uuid(row.id),
        customer_id: CustomerId::from_uuid(row.customer_id),
        service: row.service,
        amount: row.amount,
        expiry_date: row.expiry_date,
        status: parse_column("renewals.status", &row.status)?,
        reminder_days: row.reminder_days,
        notes: row.notes,
        auto_generated: row.auto_generated,
        billing_cycle: row.billing_cycle,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

fn renewal_to_row(renewal: &Renewal) -> RenewalRow {
    RenewalRow {
        id: *renewal.id.as_uuid(),
        customer_id: *renewal.customer_id.as_uuid(),
        service: renewal.service.clone(),
        amount: renewal.amount,
        expiry_date: renewal.expiry_date,
        status: renewal.status.as_str().to_string(),
        reminder_days: renewal.reminder_days,
        notes: renewal.notes.clone(),
        auto_generated: renewal.auto_generated,
        billing_cycle: renewal.billing_cycle.clone(),
        created_at: renewal.created_at,
        updated_at: renewal.updated_at,
    }
}

fn invoice_from_rows(found: InvoiceWithItems) -> Result<Invoice, DatabaseError> {
    let InvoiceWithItems { invoice: row, items } = found;
    Ok(Invoice {
        id: InvoiceId::from_uuid(row.id),
        invoice_number: row.invoice_number,
        customer_id: CustomerId::from_uuid(row.customer_id),
        amount: row.amount,
        tax: row.tax,
        total: row.total,
        status: parse_column("invoices.status", &row.status)?,
        issue_date: row.issue_date,
        due_date: row.due_date,
        notes: row.notes,
        items: items
            .into_iter()
            .map(|item| InvoiceLine {
                id: InvoiceItemId::from_uuid(item.id),
                description: item.description,
                quantity: item.quantity,
                rate: item.rate,
                amount: item.amount,
            })
            .collect(),
        auto_generated: row.auto_generated,
        billing_cycle: row.billing_cycle,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

fn invoice_to_rows(invoice: &Invoice) -> (InvoiceRow, Vec<InvoiceItemRow>) {
    let header = InvoiceRow {
        id: *invoice.id.as_uuid(),
        invoice_number: invoice.invoice_number.clone(),
        customer_id: *invoice.customer_id.as_uuid(),
        amount: invoice.amount,
        tax: invoice.tax,
        total: invoice.total,
        status: invoice.status.as_str().to_string(),
        issue_date: invoice.issue_date,
        due_date: invoice.due_date,
        notes: invoice.notes.clone(),
        auto_generated: invoice.auto_generated,
        billing_cycle: invoice.billing_cycle.clone(),
        created_at: invoice.created_at,
        updated_at: invoice.updated_at,
    };
    let items = invoice
        .items
        .iter()
        .map(|line| InvoiceItemRow {
            id: *line.id.as_uuid(),
            invoice_id: header.id,
            description: line.description.clone(),
            quantity: line.quantity,
            rate: line.rate,
            amount: line.amount,
        })
        .collect();
    (header, items)
}

fn reminder_target_from_row(row: ReminderTargetRow) -> Result<ReminderTarget, DatabaseError> {
    let reminder = RenewalReminder {
        id: ReminderId::from_uuid(row.id),
        customer_id: CustomerId::from_uuid(row.customer_id),
        service_type: parse_column("renewal_reminders.service_type", &row.service_type)?,
        service_name: row.service_name,
        expiry_date: row.expiry_date,
        reminder_days: row.reminder_days.into_iter().collect(),
        last_reminder_sent: row.last_reminder_sent,
        status: parse_column("renewal_reminders.status", &row.status)?,
        whatsapp_template: row.whatsapp_template,
    };
    Ok(ReminderTarget {
        reminder,
        customer_name: row.customer_name,
        destination: row.destination,
    })
}
