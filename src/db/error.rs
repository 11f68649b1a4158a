use deadpool_postgres::{BuildError, PoolError};
use thiserror::Error;
use tokio_postgres::error::SqlState;

// DbError is the lowest level error type, wrapping errors from the database layer. It does not wrap
// any higher level errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Unique constraint violation, with the name of the violated constraint when known
    #[error("unique violation on {}", constraint.as_deref().unwrap_or("unknown constraint"))]
    UniqueViolation { constraint: Option<String> },

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Pg(tokio_postgres::Error),

    #[error(transparent)]
    Migrate(#[from] refinery::Error),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("row decode error: {0}")]
    Decode(String),
}

impl DbError {
    /// True when this is a unique violation on the given constraint.
    pub fn violates(&self, name: &str) -> bool {
        matches!(self, DbError::UniqueViolation { constraint: Some(c) } if c == name)
    }
}

impl From<tokio_postgres::Error> for DbError {
    fn from(e: tokio_postgres::Error) -> Self {
        if let Some(db_err) = e.as_db_error() {
            if *db_err.code() == SqlState::UNIQUE_VIOLATION {
                return DbError::UniqueViolation {
                    constraint: db_err.constraint().map(str::to_string),
                };
            }
        }
        DbError::Pg(e)
    }
}
