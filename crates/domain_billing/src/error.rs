//! Billing domain errors

use core_kernel::{CustomerId, PortError, RenewalId};
use thiserror::Error;

/// Errors that can occur in the billing domain
#[derive(Debug, Error)]
pub enum BillingError {
    /// Derivation needs a source customer; there is no fallback for this
    #[error("Customer not found: {0}")]
    CustomerNotFound(CustomerId),

    #[error("Renewal not found: {0}")]
    RenewalNotFound(RenewalId),

    /// Every generated invoice number collided with an existing one
    #[error("Could not allocate a free invoice number after {attempts} attempts")]
    InvoiceNumberExhausted {
        attempts: u32,
    },

    /// The store rejected an insert as a duplicate but the existing record
    /// could not be read back
    #[error("Duplicate {entity} reported for customer {customer_id} but no existing record was found")]
    DuplicateNotVisible {
        entity: &'static str,
        customer_id: CustomerId,
    },

    /// A request referenced a field outside the allow-list or carried a bad value
    #[error("Invalid update: {0}")]
    InvalidPatch(String),

    /// A previous run of the same sweep has not finished yet
    #[error("{0} sweep already in progress")]
    SweepInProgress(&'static str),

    /// Persistence or transport failure surfaced through a port
    #[error(transparent)]
    Port(#[from] PortError),
}

impl BillingError {
    /// Returns true if retrying later could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            BillingError::Port(e) => e.is_transient(),
            BillingError::SweepInProgress(_) => true,
            _ => false,
        }
    }
}
