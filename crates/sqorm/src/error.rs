//! Error types for sqorm

use thiserror::Error;

/// Result type alias for sqorm operations
pub type SqlResult<T> = Result<T, SqlError>;

/// Error types for classification, statement building and execution
#[derive(Debug, Error)]
pub enum SqlError {
    /// The column type has no defined shape (unsupported kind or double pointer)
    #[error("unsupported type {type_name}: {reason}")]
    Classification { type_name: String, reason: String },

    /// A timestamp policy was attached to a column that cannot hold a time
    #[error("column '{column}': {policy} timestamp policy requires a time type")]
    PolicyMismatch { column: String, policy: &'static str },

    /// UPDATE or DELETE without any predicate
    #[error("{0} must have WHERE")]
    MissingWhere(&'static str),

    /// The query table and the object table disagree
    #[error("table name does not match: {query} != {object}")]
    TableMismatch { query: String, object: String },

    /// Multi-column IN received a value count that is not a multiple of the column count
    #[error("invalid number of arguments: {values} values for {columns} columns")]
    ArityMismatch { columns: usize, values: usize },

    /// Exactly-one-of received zero or several non-empty fragments
    #[error("must provide exactly one argument (got {0})")]
    Arity(usize),

    /// A partial update found no dirty column
    #[error("no column to update")]
    NoColumnsToUpdate,

    /// A filter or call received an argument it cannot use
    #[error("{0}")]
    InvalidArgument(String),

    /// The query has neither a select list nor a statement body
    #[error("no action")]
    NoAction,

    /// Row decode error
    #[error("decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Value encode error
    #[error("encode error on column '{column}': {message}")]
    Encode { column: String, message: String },

    /// Driver error
    #[error("query error: {0}")]
    Query(#[from] tokio_postgres::Error),

    /// Pool error
    #[cfg(feature = "pool")]
    #[error("pool error: {0}")]
    Pool(String),

    /// The execution deadline passed
    #[error("query timeout after {0:?}")]
    Timeout(std::time::Duration),

    /// Commit or rollback on a finished transaction
    #[error("transaction has already been committed or rolled back")]
    TxDone,

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl SqlError {
    /// Create a classification error
    pub fn classification(type_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Classification {
            type_name: type_name.into(),
            reason: reason.into(),
        }
    }

    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create an encode error for a specific column
    pub fn encode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Encode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Check if this is a missing WHERE error
    pub fn is_missing_where(&self) -> bool {
        matches!(self, Self::MissingWhere(_))
    }

    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Check if this is a finished transaction error
    pub fn is_tx_done(&self) -> bool {
        matches!(self, Self::TxDone)
    }

    /// Check if this error happened before anything was sent to the database
    pub fn is_build_error(&self) -> bool {
        matches!(
            self,
            Self::Classification { .. }
                | Self::PolicyMismatch { .. }
                | Self::MissingWhere(_)
                | Self::TableMismatch { .. }
                | Self::ArityMismatch { .. }
                | Self::Arity(_)
                | Self::NoColumnsToUpdate
                | Self::InvalidArgument(_)
                | Self::NoAction
                | Self::Encode { .. }
        )
    }

    /// SQLSTATE code of a driver error, if any
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::Query(err) => err.as_db_error().map(|db| db.code().code()),
            _ => None,
        }
    }
}

#[cfg(feature = "pool")]
impl From<deadpool_postgres::PoolError> for SqlError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Pool(err.to_string())
    }
}
