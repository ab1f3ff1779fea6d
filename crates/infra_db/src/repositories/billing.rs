//! Billing repository implementation
//!
//! Row-level access to customers, renewals, invoices and renewal reminders.
//! Statuses are stored as lowercase text and checked by the schema; the
//! adapter converts rows to domain types.
//!
//! Queries are built at runtime with `sqlx::query_as` so the crate builds
//! without a live database.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use domain_billing::{PatchValue, RenewalPatch};

use crate::error::DatabaseError;

/// Partial unique index on `renewals (customer_id, billing_cycle)`
pub const RENEWAL_CYCLE_CONSTRAINT: &str = "renewals_auto_cycle_key";

/// Partial unique index on `invoices (customer_id, billing_cycle)`
pub const INVOICE_CYCLE_CONSTRAINT: &str = "invoices_auto_cycle_key";

/// Unique constraint on `invoices (invoice_number)`
pub const INVOICE_NUMBER_CONSTRAINT: &str = "invoices_invoice_number_key";

const RENEWAL_COLUMNS: &str = "id, customer_id, service, amount, expiry_date, status, reminder_days, \
     notes, auto_generated, billing_cycle, created_at, updated_at";

const INVOICE_COLUMNS: &str = "id, invoice_number, customer_id, amount, tax, total, status, issue_date, \
     due_date, notes, auto_generated, billing_cycle, created_at, updated_at";

/// Database row for a customer
#[derive(Debug, Clone, FromRow)]
pub struct CustomerRow {
    pub id: Uuid,
    pub name: String,
    pub whatsapp_number: Option<String>,
    pub service: Option<String>,
    pub recurring_enabled: bool,
    pub recurring_interval: Option<String>,
    pub recurring_amount: Option<Decimal>,
    pub recurring_service: Option<String>,
    pub default_renewal_status: Option<String>,
    pub default_renewal_reminder_days: Option<i32>,
    pub default_renewal_notes: Option<String>,
    pub default_tax_rate: Option<Decimal>,
    pub default_due_days: Option<i32>,
    pub default_invoice_notes: Option<String>,
    pub created_at: NaiveDate,
}

/// Database row for a renewal
#[derive(Debug, Clone, FromRow)]
pub struct RenewalRow {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub service: String,
    pub amount: Decimal,
    pub expiry_date: NaiveDate,
    pub status: String,
    pub reminder_days: i32,
    pub notes: Option<String>,
    pub auto_generated: bool,
    pub billing_cycle: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Database row for an invoice header
#[derive(Debug, Clone, FromRow)]
pub struct InvoiceRow {
    pub id: Uuid,
    pub invoice_number: String,
    pub customer_id: Uuid,
    pub amount: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub status: String,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub notes: Option<String>,
    pub auto_generated: bool,
    pub billing_cycle: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Database row for an invoice line
#[derive(Debug, Clone, FromRow)]
pub struct InvoiceItemRow {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub description: String,
    pub quantity: Decimal,
    pub rate: Decimal,
    pub amount: Decimal,
}

/// An invoice header together with its lines
#[derive(Debug, Clone)]
pub struct InvoiceWithItems {
    pub invoice: InvoiceRow,
    pub items: Vec<InvoiceItemRow>,
}

/// An active reminder joined with its customer's name and number
#[derive(Debug, Clone, FromRow)]
pub struct ReminderTargetRow {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub service_type: String,
    pub service_name: String,
    pub expiry_date: NaiveDate,
    pub reminder_days: Vec<i32>,
    pub last_reminder_sent: Option<NaiveDate>,
    pub status: String,
    pub whatsapp_template: String,
    pub customer_name: String,
    pub destination: String,
}

/// Repository for billing tables
#[derive(Debug, Clone)]
pub struct BillingRepository {
    pool: PgPool,
}

impl BillingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // ========================================================================
    // Customers
    // ========================================================================

    pub async fn get_customer(&self, id: Uuid) -> Result<CustomerRow, DatabaseError> {
        sqlx::query_as::<_, CustomerRow>(
            r#"
            SELECT id, name, whatsapp_number, service, recurring_enabled, recurring_interval,
                   recurring_amount, recurring_service, default_renewal_status,
                   default_renewal_reminder_days, default_renewal_notes, default_tax_rate,
                   default_due_days, default_invoice_notes, created_at
            FROM customers
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DatabaseError::not_found("Customer", id))
    }

    /// Recurring customers without an active or expiring auto renewal
    pub async fn customers_missing_auto_renewal(&self) -> Result<Vec<Uuid>, DatabaseError> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT c.id
            FROM customers c
            WHERE c.recurring_enabled
              AND NOT EXISTS (
                  SELECT 1 FROM renewals r
                  WHERE r.customer_id = c.id
                    AND r.auto_generated
                    AND r.status IN ('active', 'expiring')
              )
            ORDER BY c.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    // ========================================================================
    // Renewals
    // ========================================================================

    pub async fn find_open_auto_renewal(&self, customer_id: Uuid) -> Result<Option<RenewalRow>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM renewals \
             WHERE customer_id = $1 AND auto_generated AND status IN ('active', 'expiring') \
             ORDER BY expiry_date DESC LIMIT 1",
            RENEWAL_COLUMNS
        );
        Ok(sqlx::query_as::<_, RenewalRow>(&sql)
            .bind(customer_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn find_auto_renewal_by_cycle(
        &self,
        customer_id: Uuid,
        billing_cycle: &str,
    ) -> Result<Option<RenewalRow>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM renewals WHERE customer_id = $1 AND auto_generated AND billing_cycle = $2",
            RENEWAL_COLUMNS
        );
        Ok(sqlx::query_as::<_, RenewalRow>(&sql)
            .bind(customer_id)
            .bind(billing_cycle)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn insert_renewal(&self, row: &RenewalRow) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO renewals (
                id, customer_id, service, amount, expiry_date, status, reminder_days,
                notes, auto_generated, billing_cycle, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(row.id)
        .bind(row.customer_id)
        .bind(&row.service)
        .bind(row.amount)
        .bind(row.expiry_date)
        .bind(&row.status)
        .bind(row.reminder_days)
        .bind(&row.notes)
        .bind(row.auto_generated)
        .bind(&row.billing_cycle)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Updates the patched columns and returns the new row
    ///
    /// Column names come from the patch's fixed field table, never from
    /// request input; values are always bound.
    pub async fn update_renewal(&self, id: Uuid, patch: &RenewalPatch) -> Result<RenewalRow, DatabaseError> {
        let mut query: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE renewals SET ");
        let mut assignments = query.separated(", ");
        for (field, value) in patch.iter() {
            assignments.push(format!("{} = ", field.column()));
            match value {
                PatchValue::Text(text) => assignments.push_bind_unseparated(text.clone()),
                PatchValue::OptionalText(text) => assignments.push_bind_unseparated(text.clone()),
                PatchValue::Amount(amount) => assignments.push_bind_unseparated(*amount),
                PatchValue::Date(date) => assignments.push_bind_unseparated(*date),
                PatchValue::Status(status) => assignments.push_bind_unseparated(status.as_str()),
                PatchValue::Days(days) => assignments.push_bind_unseparated(*days),
            };
        }
        assignments.push("updated_at = NOW()");

        query.push(" WHERE id = ");
        query.push_bind(id);
        query.push(" RETURNING ");
        query.push(RENEWAL_COLUMNS);

        query
            .build_query_as::<RenewalRow>()
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::not_found("Renewal", id))
    }

    pub async fn expire_renewals(&self, today: NaiveDate) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            "UPDATE renewals SET status = 'expired', updated_at = NOW() \
             WHERE expiry_date < $1 AND status <> 'expired'",
        )
        .bind(today)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn mark_expiring_renewals(&self, start: NaiveDate, end: NaiveDate) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            "UPDATE renewals SET status = 'expiring', updated_at = NOW() \
             WHERE status = 'active' AND expiry_date BETWEEN $1 AND $2",
        )
        .bind(start)
        .bind(end)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    // ========================================================================
    // Invoices
    // ========================================================================

    pub async fn find_open_auto_invoice(&self, customer_id: Uuid) -> Result<Option<InvoiceWithItems>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM invoices \
             WHERE customer_id = $1 AND auto_generated AND status = 'draft' \
             ORDER BY created_at DESC LIMIT 1",
            INVOICE_COLUMNS
        );
        let row = sqlx::query_as::<_, InvoiceRow>(&sql)
            .bind(customer_id)
            .fetch_optional(&self.pool)
            .await?;
        self.with_items(row).await
    }

    pub async fn find_auto_invoice_by_cycle(
        &self,
        customer_id: Uuid,
        billing_cycle: &str,
    ) -> Result<Option<InvoiceWithItems>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM invoices WHERE customer_id = $1 AND auto_generated AND billing_cycle = $2",
            INVOICE_COLUMNS
        );
        let row = sqlx::query_as::<_, InvoiceRow>(&sql)
            .bind(customer_id)
            .bind(billing_cycle)
            .fetch_optional(&self.pool)
            .await?;
        self.with_items(row).await
    }

    /// Highest invoice number with the given prefix
    pub async fn latest_invoice_number(&self, prefix: &str) -> Result<Option<String>, DatabaseError> {
        let number = sqlx::query_scalar::<_, String>(
            r#"
            SELECT invoice_number
            FROM invoices
            WHERE starts_with(invoice_number, $1)
            ORDER BY length(invoice_number) DESC, invoice_number DESC
            LIMIT 1
            "#,
        )
        .bind(prefix)
        .fetch_optional(&self.pool)
        .await?;
        Ok(number)
    }

    /// Inserts the header and its lines in one transaction
    ///
    /// Any failure rolls the whole invoice back when the transaction drops.
    pub async fn insert_invoice(&self, invoice: &InvoiceRow, items: &[InvoiceItemRow]) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO invoices (
                id, invoice_number, customer_id, amount, tax, total, status, issue_date,
                due_date, notes, auto_generated, billing_cycle, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(invoice.id)
        .bind(&invoice.invoice_number)
        .bind(invoice.customer_id)
        .bind(invoice.amount)
        .bind(invoice.tax)
        .bind(invoice.total)
        .bind(&invoice.status)
        .bind(invoice.issue_date)
        .bind(invoice.due_date)
        .bind(&invoice.notes)
        .bind(invoice.auto_generated)
        .bind(&invoice.billing_cycle)
        .bind(invoice.created_at)
        .bind(invoice.updated_at)
        .execute(&mut *tx)
        .await?;

        for (position, item) in items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO invoice_items (id, invoice_id, position, description, quantity, rate, amount)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(item.id)
            .bind(invoice.id)
            .bind(position as i32)
            .bind(&item.description)
            .bind(item.quantity)
            .bind(item.rate)
            .bind(item.amount)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn mark_overdue_invoices(&self, today: NaiveDate) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            "UPDATE invoices SET status = 'overdue', updated_at = NOW() \
             WHERE status = 'sent' AND due_date < $1",
        )
        .bind(today)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn with_items(&self, row: Option<InvoiceRow>) -> Result<Option<InvoiceWithItems>, DatabaseError> {
        let Some(invoice) = row else {
            return Ok(None);
        };
        let items = sqlx::query_as::<_, InvoiceItemRow>(
            r#"
            SELECT id, invoice_id, description, quantity, rate, amount
            FROM invoice_items
            WHERE invoice_id = $1
            ORDER BY position
            "#,
        )
        .bind(invoice.id)
        .fetch_all(&self.pool)
        .await?;
        Ok(Some(InvoiceWithItems { invoice, items }))
    }

    // ========================================================================
    // Reminders
    // ========================================================================

    /// Active reminders whose customer has a non-blank WhatsApp number
    pub async fn active_reminder_targets(&self) -> Result<Vec<ReminderTargetRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, ReminderTargetRow>(
            r#"
            SELECT rr.id, rr.customer_id, rr.service_type, rr.service_name, rr.expiry_date,
                   rr.reminder_days, rr.last_reminder_sent, rr.status, rr.whatsapp_template,
                   c.name AS customer_name, btrim(c.whatsapp_number) AS destination
            FROM renewal_reminders rr
            JOIN customers c ON c.id = rr.customer_id
            WHERE rr.status = 'active'
              AND c.whatsapp_number IS NOT NULL
              AND btrim(c.whatsapp_number) <> ''
            ORDER BY rr.expiry_date
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn mark_reminder_sent(&self, id: Uuid, sent_on: NaiveDate) -> Result<(), DatabaseError> {
        let result = sqlx::query("UPDATE renewal_reminders SET last_reminder_sent = $2 WHERE id = $1")
            .bind(id)
            .bind(sent_on)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("RenewalReminder", id));
        }
        Ok(())
    }
}
