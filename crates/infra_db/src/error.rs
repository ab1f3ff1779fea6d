//! Database error types
//!
//! SQLx errors are classified by PostgreSQL SQLSTATE so callers can tell a
//! uniqueness violation from a lost connection. Unique violations keep the
//! name of the violated constraint; the billing adapter uses it to report
//! which uniqueness rule was hit.

use thiserror::Error;

use core_kernel::PortError;

/// Errors that can occur during database operations
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to establish a database connection
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Entity not found in database
    #[error("{entity} with id '{id}' not found")]
    NotFound {
        entity: &'static str,
        id: String,
    },

    /// Unique constraint violation (SQLSTATE 23505)
    #[error("Duplicate entry violates {constraint}: {message}")]
    DuplicateEntry {
        constraint: String,
        message: String,
    },

    /// Foreign key constraint violation (SQLSTATE 23503)
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// Check constraint violation (SQLSTATE 23514)
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Migration error
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// A stored value does not map to a domain value
    #[error("Invalid stored data: {0}")]
    InvalidData(String),

    /// Pool exhaustion - no available connections
    #[error("Connection pool exhausted")]
    PoolExhausted,
}

impl DatabaseError {
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        DatabaseError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn invalid_data(column: &str, value: impl std::fmt::Display) -> Self {
        DatabaseError::InvalidData(format!("{} = '{}'", column, value))
    }

    /// Checks if this error indicates a record was not found
    pub fn is_not_found(&self) -> bool {
        matches!(self, DatabaseError::NotFound { .. })
    }

    /// Checks if this error is a constraint violation
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            DatabaseError::DuplicateEntry { .. }
                | DatabaseError::ForeignKeyViolation(_)
                | DatabaseError::ConstraintViolation(_)
        )
    }

    /// Checks if this error is a connection-related issue
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            DatabaseError::ConnectionFailed(_) | DatabaseError::PoolExhausted
        )
    }

    /// Name of the violated unique constraint, if this is a unique violation
    pub fn violated_constraint(&self) -> Option<&str> {
        match self {
            DatabaseError::DuplicateEntry { constraint, .. } => Some(constraint.as_str()),
            _ => None,
        }
    }
}

/// Maps SQLx errors to specific variants by PostgreSQL error code
///
/// See <https://www.postgresql.org/docs/current/errcodes-appendix.html>
impl From<sqlx::Error> for DatabaseError {
    fn from(error: sqlx::Error) -> Self {
        match &error {
            sqlx::Error::RowNotFound => DatabaseError::QueryFailed("no rows returned".to_string()),
            sqlx::Error::PoolTimedOut => DatabaseError::PoolExhausted,
            sqlx::Error::PoolClosed | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
                DatabaseError::ConnectionFailed(error.to_string())
            }
            sqlx::Error::Database(db_err) => {
                let message = db_err.message().to_string();
                match db_err.code().as_deref() {
                    Some("23505") => DatabaseError::DuplicateEntry {
                        constraint: db_err.constraint().unwrap_or_default().to_string(),
                        message,
                    },
                    Some("23503") => DatabaseError::ForeignKeyViolation(message),
                    Some("23514") => DatabaseError::ConstraintViolation(message),
                    _ => DatabaseError::QueryFailed(message),
                }
            }
            _ => DatabaseError::QueryFailed(error.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DatabaseError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        DatabaseError::MigrationFailed(error.to_string())
    }
}

/// Generic translation to the port taxonomy
///
/// Unique violations become `Duplicate` keyed by the constraint name; the
/// billing adapter rewrites known constraint names to domain keys first.
impl From<DatabaseError> for PortError {
    fn from(error: DatabaseError) -> Self {
        match error {
            DatabaseError::NotFound { entity, id } => PortError::NotFound {
                entity_type: entity.to_string(),
                id,
            },
            DatabaseError::DuplicateEntry { constraint, .. } => PortError::Duplicate {
                entity_type: "row".to_string(),
                key: constraint,
            },
            DatabaseError::ForeignKeyViolation(message) => PortError::Conflict { message },
            DatabaseError::ConstraintViolation(message) => PortError::Validation { message, field: None },
            DatabaseError::InvalidData(message) => PortError::Transformation { message },
            DatabaseError::ConnectionFailed(message) => PortError::connection(message),
            DatabaseError::PoolExhausted => PortError::Timeout {
                operation: "acquire database connection".to_string(),
                duration_ms: 0,
            },
            other => PortError::internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_maps_to_port_duplicate() {
        let error = DatabaseError::DuplicateEntry {
            constraint: "invoices_invoice_number_key".to_string(),
            message: "duplicate key value".to_string(),
        };
        assert_eq!(error.violated_constraint(), Some("invoices_invoice_number_key"));

        let port: PortError = error.into();
        assert!(port.is_duplicate_of("invoices_invoice_number_key"));
    }

    #[test]
    fn test_not_found_and_connection_mapping() {
        let port: PortError = DatabaseError::not_found("Customer", "CUS-1").into();
        assert!(port.is_not_found());

        let port: PortError = DatabaseError::PoolExhausted.into();
        assert!(port.is_transient());
    }

    #[test]
    fn test_missing_parent_row_is_a_conflict() {
        let port: PortError = DatabaseError::ForeignKeyViolation("renewals_customer_id_fkey".to_string()).into();
        assert!(matches!(port, PortError::Conflict { .. }));
        assert!(!port.is_transient());
    }

    #[test]
    fn test_pool_timeout_classified() {
        let error: DatabaseError = sqlx::Error::PoolTimedOut.into();
        assert!(error.is_connection_error());
    }
}
