//! Shared vocabulary for ports and adapters
//!
//! The billing services reach PostgreSQL and the WhatsApp gateway only
//! through port traits defined in `domain_billing`. Adapters on both sides
//! report failures as [`PortError`] and expose a [`HealthCheckable`] probe.
//!
//! ```text
//!   domain_billing services ──► BillingStore / Notifier (ports)
//!                                   ▲                 ▲
//!                        PostgresBillingAdapter   WhatsAppNotifier
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure reported by any adapter
#[derive(Debug, Error)]
pub enum PortError {
    #[error("{entity_type} {id} does not exist")]
    NotFound { entity_type: String, id: String },

    /// Input the other side refused
    #[error("Rejected input: {message}")]
    Validation { message: String, field: Option<String> },

    /// The write refers to data that changed underneath it
    #[error("Conflicting state: {message}")]
    Conflict { message: String },

    /// A uniqueness rule rejected the write
    ///
    /// `key` is the rule's domain name, e.g. `invoice_number` or
    /// `billing_cycle`.
    #[error("{entity_type} already exists for {key}")]
    Duplicate { entity_type: String, key: String },

    #[error("Cannot reach backend: {message}")]
    Connection { message: String },

    #[error("{operation} gave up after {duration_ms}ms")]
    Timeout { operation: String, duration_ms: u64 },

    #[error("Credentials refused: {message}")]
    Unauthorized { message: String },

    #[error("Throttled, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("{service} is unavailable")]
    ServiceUnavailable { service: String },

    /// A stored value does not fit the domain type
    #[error("Malformed stored value: {message}")]
    Transformation { message: String },

    #[error("Internal failure: {message}")]
    Internal { message: String },
}

impl PortError {
    pub fn not_found(entity_type: impl Into<String>, id: impl fmt::Display) -> Self {
        PortError::NotFound {
            entity_type: entity_type.into(),
            id: id.to_string(),
        }
    }

    pub fn validation_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        PortError::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    pub fn duplicate(entity_type: impl Into<String>, key: impl Into<String>) -> Self {
        PortError::Duplicate {
            entity_type: entity_type.into(),
            key: key.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        PortError::Connection { message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        PortError::Internal { message: message.into() }
    }

    /// Whether the next scheduled run may succeed without intervention
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PortError::Connection { .. }
                | PortError::Timeout { .. }
                | PortError::RateLimited { .. }
                | PortError::ServiceUnavailable { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, PortError::NotFound { .. })
    }

    pub fn is_duplicate_of(&self, key: &str) -> bool {
        matches!(self, PortError::Duplicate { key: k, .. } if k == key)
    }
}

/// Implemented by every port trait object
pub trait DomainPort: Send + Sync + 'static {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterHealth {
    Healthy,
    /// Reachable but slow
    Degraded,
    Unhealthy,
}

/// Outcome of one health probe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub adapter_id: String,
    pub status: AdapterHealth,
    pub latency_ms: u64,
    pub message: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl HealthCheckResult {
    pub fn is_healthy(&self) -> bool {
        self.status == AdapterHealth::Healthy
    }
}

#[async_trait::async_trait]
pub trait HealthCheckable: Send + Sync {
    async fn health_check(&self) -> HealthCheckResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_customer_message() {
        let error = PortError::not_found("Customer", "CUS-42");
        assert!(error.is_not_found());
        assert!(!error.is_transient());
        assert_eq!(error.to_string(), "Customer CUS-42 does not exist");
    }

    #[test]
    fn test_gateway_failures_are_transient() {
        let timeout = PortError::Timeout {
            operation: "whatsapp send".to_string(),
            duration_ms: 5000,
        };
        assert!(timeout.is_transient());
        assert!(PortError::connection("refused").is_transient());
        assert!(!PortError::validation_field("bad number", "destination").is_transient());
    }

    #[test]
    fn test_validation_keeps_field() {
        let error = PortError::validation_field("not a phone number", "destination");
        assert_eq!(error.to_string(), "Rejected input: not a phone number");
        assert!(matches!(error, PortError::Validation { field: Some(f), .. } if f == "destination"));
    }

    #[test]
    fn test_duplicate_key_matching() {
        let error = PortError::duplicate("Invoice", "invoice_number");
        assert!(error.is_duplicate_of("invoice_number"));
        assert!(!error.is_duplicate_of("billing_cycle"));
        assert!(!PortError::internal("boom").is_duplicate_of("invoice_number"));
    }

    #[test]
    fn test_health_status_wire_names() {
        let json = serde_json::to_string(&AdapterHealth::Degraded).unwrap();
        assert_eq!(json, "\"degraded\"");
    }
}
