//! Repository implementations
//!
//! Repositories own the SQL for their tables and work in row types. Queries
//! are runtime-checked (`sqlx::query_as`), so building the crate needs no
//! database.

pub mod billing;

pub use billing::BillingRepository;
