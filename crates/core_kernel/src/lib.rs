//! Core Kernel - Foundational types and utilities for the CRM billing core
//!
//! This crate provides the building blocks shared by the billing domain and
//! its adapters:
//! - Calendar arithmetic and an injectable clock
//! - Strongly-typed identifiers
//! - Port error taxonomy used by every adapter

pub mod temporal;
pub mod identifiers;
pub mod ports;

pub use temporal::{
    Clock, SystemClock, FixedClock, Timezone, TemporalError,
    to_calendar_date, add_months, days_until,
};
pub use identifiers::{CustomerId, RenewalId, InvoiceId, InvoiceItemId, ReminderId};
pub use ports::{
    PortError, DomainPort, HealthCheckable, HealthCheckResult, AdapterHealth,
};
