//! Custom Test Assertions
//!
//! Assertion helpers for billing results that give more useful failure
//! messages than plain `assert_eq!`.

use rust_decimal::Decimal;

use domain_billing::{AutoGenerated, Renewal, RenewalStatus};

/// Asserts a money amount equals `expected` and carries exactly two decimals
pub fn assert_money_eq(actual: Decimal, expected: Decimal) {
    assert_eq!(
        actual, expected,
        "Amount mismatch: actual={}, expected={}",
        actual, expected
    );
    assert_eq!(
        actual.scale(),
        2,
        "Expected two decimal places, got {} ({})",
        actual.scale(),
        actual
    );
}

/// Asserts that the call created the record and returns it
pub fn assert_created<T: std::fmt::Debug>(result: AutoGenerated<T>) -> T {
    assert!(result.was_created(), "Expected a newly created record, got {:?}", result);
    result.into_inner()
}

/// Asserts that the call returned an existing record and returns it
pub fn assert_existing<T: std::fmt::Debug>(result: AutoGenerated<T>) -> T {
    assert!(!result.was_created(), "Expected an existing record, got {:?}", result);
    result.into_inner()
}

/// Asserts the status of a renewal
pub fn assert_renewal_status(renewal: &Renewal, expected: RenewalStatus) {
    assert_eq!(
        renewal.status, expected,
        "Renewal {} (expiry {}) has status {}, expected {}",
        renewal.id, renewal.expiry_date, renewal.status, expected
    );
}
