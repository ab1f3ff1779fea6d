//! Infrastructure Database Layer
//!
//! PostgreSQL persistence for the billing core, built on SQLx.
//!
//! # Architecture
//!
//! - [`pool`]: connection pool configuration and schema migrations
//! - [`repositories`]: SQL over row types
//! - [`adapters`]: `BillingStore` implementation over the repositories
//!
//! The uniqueness rules the billing services rely on live in the schema
//! (`migrations/`): a partial unique index per table on
//! `(customer_id, billing_cycle)` for auto-generated rows, and a unique
//! invoice number.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{connect, DatabaseConfig, PostgresBillingAdapter};
//!
//! let pool = connect(&DatabaseConfig::new("postgres://localhost/crm")).await?;
//! let store = PostgresBillingAdapter::new(pool);
//! ```

pub mod pool;
pub mod error;
pub mod repositories;
pub mod adapters;

pub use pool::{connect, create_pool, run_migrations, DatabaseConfig, DatabasePool};
pub use error::DatabaseError;
pub use repositories::BillingRepository;
pub use adapters::PostgresBillingAdapter;
