use thiserror::Error;

use crate::database::manager::DatabaseError;

/// SQLSTATE raised when `statement_timeout` cancels a statement.
const QUERY_CANCELED: &str = "57014";

/// Errors produced by the tenancy layer.
///
/// Display strings are safe to log but are not meant for end users; the
/// HTTP layer maps each kind to its own client message.
#[derive(Debug, Error)]
pub enum TenancyError {
    #[error("missing tenant context")]
    MissingTenantContext,

    /// The raw value is kept for security logs only.
    #[error("malformed tenant identifier")]
    MalformedIdentifier(String),

    #[error("tenant is not available")]
    TenantUnavailable,

    #[error("schema context could not be established")]
    SchemaContext(#[source] Option<sqlx::Error>),

    #[error("transaction timed out")]
    TransactionTimeout,

    #[error("nested scoped transaction")]
    NestedScope,

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl TenancyError {
    /// True for the kinds a caller may retry with a fresh scoped transaction.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TenancyError::TransactionTimeout)
    }
}

impl From<sqlx::Error> for TenancyError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.code().as_deref() == Some(QUERY_CANCELED) {
                return TenancyError::TransactionTimeout;
            }
        }
        TenancyError::Database(DatabaseError::Sqlx(err))
    }
}
