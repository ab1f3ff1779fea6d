//! Domain Adapters
//!
//! Implementations of domain ports on top of the repositories. An adapter
//! translates between row and domain types and maps database errors to
//! `PortError`.
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use domain_billing::BillingStore;
//! use infra_db::adapters::PostgresBillingAdapter;
//!
//! let store: Arc<dyn BillingStore> = Arc::new(PostgresBillingAdapter::new(pool));
//! let customer = store.get_customer(customer_id).await?;
//! ```

pub mod billing;

pub use billing::PostgresBillingAdapter;
