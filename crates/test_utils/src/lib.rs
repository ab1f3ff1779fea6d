//! Test Utilities Crate
//!
//! Provides shared test infrastructure, fixtures, and helpers for the
//! CRM billing core test suite.
//!
//! # Modules
//!
//! - `fixtures`: Reference dates and ready-made customers
//! - `builders`: Builder patterns for customers, renewals, invoices and reminders
//! - `database`: PostgreSQL testcontainer with the billing schema applied
//! - `assertions`: Assertion helpers for billing results
//! - `generators`: Property-based test data generators

pub mod fixtures;
pub mod builders;
pub mod database;
pub mod assertions;
pub mod generators;

pub use fixtures::*;
pub use builders::*;
pub use database::*;
pub use assertions::*;
pub use generators::*;
