//! PostgreSQL adapter tests
//!
//! These run against a real PostgreSQL in a testcontainer and need Docker:
//!
//! ```text
//! cargo test -p infra_db -- --ignored
//! ```

use std::sync::Arc;

use rust_decimal_macros::dec;
use sqlx::PgPool;

use core_kernel::temporal::DateRange;
use core_kernel::RenewalId;
use domain_billing::ports::{BILLING_CYCLE_KEY, INVOICE_NUMBER_KEY};
use domain_billing::{
    AutoGenerationService, BillingStore, Customer, InvoiceStatus, PatchValue, RenewalField, RenewalPatch,
    RenewalReminder, RenewalStatus,
};
use infra_db::PostgresBillingAdapter;
use test_utils::{
    CustomerFixtures, DateFixtures, InvoiceBuilder, ReminderBuilder, RenewalBuilder, TestDatabase,
};

async fn insert_customer(pool: &PgPool, customer: &Customer) {
    sqlx::query(
        r#"
        INSERT INTO customers (
            id, name, whatsapp_number, service, recurring_enabled, recurring_interval,
            recurring_amount, recurring_service, default_tax_rate, default_due_days, created_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(*customer.id.as_uuid())
    .bind(&customer.name)
    .bind(&customer.whatsapp_number)
    .bind(&customer.service)
    .bind(customer.recurring_enabled)
    .bind(customer.recurring_interval.map(|i| i.as_str()))
    .bind(customer.recurring_amount)
    .bind(&customer.recurring_service)
    .bind(customer.default_tax_rate)
    .bind(customer.default_due_days)
    .bind(customer.created_at)
    .execute(pool)
    .await
    .expect("insert customer");
}

async fn insert_reminder(pool: &PgPool, reminder: &RenewalReminder) {
    let offsets: Vec<i32> = reminder.reminder_days.iter().copied().collect();
    sqlx::query(
        r#"
        INSERT INTO renewal_reminders (
            id, customer_id, service_type, service_name, expiry_date, reminder_days,
            last_reminder_sent, status, whatsapp_template
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(*reminder.id.as_uuid())
    .bind(*reminder.customer_id.as_uuid())
    .bind(reminder.service_type.as_str())
    .bind(&reminder.service_name)
    .bind(reminder.expiry_date)
    .bind(offsets)
    .bind(reminder.last_reminder_sent)
    .bind(reminder.status.as_str())
    .bind(&reminder.whatsapp_template)
    .execute(pool)
    .await
    .expect("insert reminder");
}

async fn setup() -> (TestDatabase, PostgresBillingAdapter) {
    let db = TestDatabase::new().await.expect("start test database");
    let adapter = PostgresBillingAdapter::new(db.pool().clone());
    (db, adapter)
}

mod uniqueness {
    use super::*;

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_second_auto_renewal_for_cycle_rejected() {
        let (db, store) = setup().await;
        let customer = CustomerFixtures::monthly_hosting();
        insert_customer(db.pool(), &customer).await;

        let first = RenewalBuilder::for_customer(customer.id).auto_generated("2024-03").build();
        let second = RenewalBuilder::for_customer(customer.id).auto_generated("2024-03").build();

        store.insert_renewal(&first).await.unwrap();
        let err = store.insert_renewal(&second).await.unwrap_err();
        assert!(err.is_duplicate_of(BILLING_CYCLE_KEY), "got {:?}", err);

        let found = store
            .find_auto_renewal_by_cycle(customer.id, "2024-03")
            .await
            .unwrap()
            .expect("winner visible");
        assert_eq!(found.id, first.id);
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_manual_renewals_are_not_cycle_keyed() {
        let (db, store) = setup().await;
        let customer = CustomerFixtures::monthly_hosting();
        insert_customer(db.pool(), &customer).await;

        store.insert_renewal(&RenewalBuilder::for_customer(customer.id).build()).await.unwrap();
        store.insert_renewal(&RenewalBuilder::for_customer(customer.id).build()).await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_taken_invoice_number_rejected_atomically() {
        let (db, store) = setup().await;
        let a = CustomerFixtures::monthly_hosting();
        let b = CustomerFixtures::yearly_leap_day();
        insert_customer(db.pool(), &a).await;
        insert_customer(db.pool(), &b).await;

        let first = InvoiceBuilder::for_customer(a.id).numbered("INV-2024-0001").build();
        let clash = InvoiceBuilder::for_customer(b.id).numbered("INV-2024-0001").build();

        store.insert_invoice(&first).await.unwrap();
        let err = store.insert_invoice(&clash).await.unwrap_err();
        assert!(err.is_duplicate_of(INVOICE_NUMBER_KEY), "got {:?}", err);

        let orphan_items: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM invoice_items WHERE invoice_id = $1")
            .bind(*clash.id.as_uuid())
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(orphan_items, 0);
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_latest_number_ranks_longer_sequences_first() {
        let (db, store) = setup().await;
        let customer = CustomerFixtures::monthly_hosting();
        insert_customer(db.pool(), &customer).await;

        for number in ["INV-2024-9999", "INV-2024-10000", "INV-2023-20000"] {
            store
                .insert_invoice(&InvoiceBuilder::for_customer(customer.id).numbered(number).build())
                .await
                .unwrap();
        }

        let latest = store.latest_invoice_number("INV-2024-").await.unwrap();
        assert_eq!(latest.as_deref(), Some("INV-2024-10000"));
        assert_eq!(store.latest_invoice_number("INV-2025-").await.unwrap(), None);
    }
}

mod round_trips {
    use super::*;

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_invoice_lines_read_back_in_order() {
        let (db, store) = setup().await;
        let customer = CustomerFixtures::monthly_hosting();
        insert_customer(db.pool(), &customer).await;

        let invoice = InvoiceBuilder::for_customer(customer.id)
            .numbered("INV-2024-0042")
            .auto_generated("2024-02")
            .build();
        store.insert_invoice(&invoice).await.unwrap();

        let found = store
            .find_open_auto_invoice(customer.id)
            .await
            .unwrap()
            .expect("open auto invoice");
        assert_eq!(found.invoice_number, "INV-2024-0042");
        assert_eq!(found.status, InvoiceStatus::Draft);
        let expected: Vec<&str> = invoice.items.iter().map(|l| l.description.as_str()).collect();
        let actual: Vec<&str> = found.items.iter().map(|l| l.description.as_str()).collect();
        assert_eq!(actual, expected);
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_patch_updates_only_listed_columns() {
        let (db, store) = setup().await;
        let customer = CustomerFixtures::monthly_hosting();
        insert_customer(db.pool(), &customer).await;
        let renewal = RenewalBuilder::for_customer(customer.id).build();
        store.insert_renewal(&renewal).await.unwrap();

        let patch = RenewalPatch::default()
            .set(RenewalField::Amount, PatchValue::Amount(dec!(1500.00)))
            .and_then(|p| p.set(RenewalField::Notes, PatchValue::OptionalText(Some("upgraded".to_string()))))
            .unwrap();
        let updated = store.update_renewal(renewal.id, &patch).await.unwrap();

        assert_eq!(updated.amount, dec!(1500.00));
        assert_eq!(updated.notes.as_deref(), Some("upgraded"));
        assert_eq!(updated.service, renewal.service);
        assert_eq!(updated.expiry_date, renewal.expiry_date);
        assert!(updated.updated_at >= renewal.updated_at);
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_patch_of_unknown_renewal_is_not_found() {
        let (_db, store) = setup().await;
        let patch = RenewalPatch::default()
            .set(RenewalField::ReminderDays, PatchValue::Days(10))
            .unwrap();
        let err = store.update_renewal(RenewalId::new(), &patch).await.unwrap_err();
        assert!(err.is_not_found());
    }
}

mod reminders {
    use super::*;

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_blank_destinations_are_excluded() {
        let (db, store) = setup().await;
        let reachable = CustomerFixtures::monthly_hosting();
        let mut blank = CustomerFixtures::yearly_leap_day();
        blank.whatsapp_number = Some("   ".to_string());
        insert_customer(db.pool(), &reachable).await;
        insert_customer(db.pool(), &blank).await;

        let expiry = DateFixtures::date(2024, 3, 1);
        insert_reminder(db.pool(), &ReminderBuilder::for_customer(reachable.id, expiry).build()).await;
        insert_reminder(db.pool(), &ReminderBuilder::for_customer(blank.id, expiry).build()).await;

        let targets = store.active_reminder_targets().await.unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].reminder.customer_id, reachable.id);
        assert_eq!(targets[0].destination, "+919812345678");
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_mark_sent_records_day() {
        let (db, store) = setup().await;
        let customer = CustomerFixtures::monthly_hosting();
        insert_customer(db.pool(), &customer).await;
        let reminder = ReminderBuilder::for_customer(customer.id, DateFixtures::date(2024, 3, 1)).build();
        insert_reminder(db.pool(), &reminder).await;

        store.mark_reminder_sent(reminder.id, DateFixtures::today()).await.unwrap();

        let targets = store.active_reminder_targets().await.unwrap();
        assert_eq!(targets[0].reminder.last_reminder_sent, Some(DateFixtures::today()));
    }
}

mod status_sweep {
    use super::*;

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_bulk_transitions_report_counts() {
        let (db, store) = setup().await;
        let customer = CustomerFixtures::monthly_hosting();
        insert_customer(db.pool(), &customer).await;
        let today = DateFixtures::today();

        let past = RenewalBuilder::for_customer(customer.id).expiring_on(DateFixtures::date(2024, 2, 1)).build();
        let soon = RenewalBuilder::for_customer(customer.id).expiring_on(DateFixtures::date(2024, 3, 1)).build();
        let later = RenewalBuilder::for_customer(customer.id).expiring_on(DateFixtures::date(2024, 6, 1)).build();
        for renewal in [&past, &soon, &later] {
            store.insert_renewal(renewal).await.unwrap();
        }
        let overdue = InvoiceBuilder::for_customer(customer.id)
            .numbered("INV-2024-0001")
            .with_status(InvoiceStatus::Sent)
            .due_on(DateFixtures::date(2024, 2, 10))
            .build();
        store.insert_invoice(&overdue).await.unwrap();

        assert_eq!(store.expire_renewals(today).await.unwrap(), 1);
        assert_eq!(store.mark_expiring_renewals(DateRange::days_from(today, 30)).await.unwrap(), 1);
        assert_eq!(store.mark_overdue_invoices(today).await.unwrap(), 1);

        // Second run is a no-op
        assert_eq!(store.expire_renewals(today).await.unwrap(), 0);
        assert_eq!(store.mark_expiring_renewals(DateRange::days_from(today, 30)).await.unwrap(), 0);
        assert_eq!(store.mark_overdue_invoices(today).await.unwrap(), 0);

        let open = store.find_open_auto_renewal(customer.id).await.unwrap();
        assert!(open.is_none());
        let status: String = sqlx::query_scalar("SELECT status FROM renewals WHERE id = $1")
            .bind(*soon.id.as_uuid())
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(status, RenewalStatus::Expiring.as_str());
    }
}

mod auto_generation {
    use super::*;

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_concurrent_requests_converge_on_one_renewal() {
        let (db, store) = setup().await;
        let customer = CustomerFixtures::monthly_hosting();
        insert_customer(db.pool(), &customer).await;

        let store: Arc<dyn BillingStore> = Arc::new(store);
        let clock = Arc::new(DateFixtures::clock_on(DateFixtures::today()));
        let service = Arc::new(AutoGenerationService::new(store.clone(), clock));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = service.clone();
                let id = customer.id;
                tokio::spawn(async move { service.create_auto_renewal_if_absent(id).await })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap().into_inner().id);
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM renewals WHERE customer_id = $1")
            .bind(*customer.id.as_uuid())
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_invoice_numbering_continues_from_stored_sequence() {
        let (db, store) = setup().await;
        let customer = CustomerFixtures::monthly_hosting();
        insert_customer(db.pool(), &customer).await;
        store
            .insert_invoice(&InvoiceBuilder::for_customer(customer.id).numbered("INV-2024-0041").build())
            .await
            .unwrap();

        let store: Arc<dyn BillingStore> = Arc::new(store);
        let clock = Arc::new(DateFixtures::clock_on(DateFixtures::today()));
        let service = AutoGenerationService::new(store, clock);

        let invoice = service
            .create_auto_invoice_if_absent(customer.id)
            .await
            .unwrap()
            .into_inner();
        assert_eq!(invoice.invoice_number, "INV-2024-0042");
        assert_eq!(invoice.total, dec!(1180.00));
    }
}

mod connection {
    use super::*;
    use core_kernel::{AdapterHealth, HealthCheckable};
    use infra_db::{connect, DatabaseConfig};

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_connect_is_repeatable_and_healthy() {
        let db = TestDatabase::new().await.expect("start test database");
        let config = DatabaseConfig::new(db.url()).max_connections(2);

        // migrations were already applied by the fixture
        let pool = connect(&config).await.unwrap();
        let store = PostgresBillingAdapter::new(pool);

        let health = store.health_check().await;
        assert_ne!(health.status, AdapterHealth::Unhealthy, "{:?}", health.message);
    }
}
