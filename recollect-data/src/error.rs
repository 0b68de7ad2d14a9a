use crate::query::QueryError;

/// Errors that can occur in the data layer.
///
/// `CountUnsupported` is the one variant callers are expected to catch as a
/// normal branch: it means pagination has degraded to a count-free mode, not
/// that the operation failed.
#[derive(Debug)]
pub enum DataError {
    /// A key lookup found no row.
    NotFound(String),
    /// Invalid setup, raised when an instance is constructed.
    Configuration(String),
    /// An exact count was requested but no count is obtainable.
    CountUnsupported(String),
    /// Eager materialization exceeded the hard limit.
    ResultTooLarge { limit: u64, fetched: u64 },
    /// Malformed input such as a null key or a corrupt page token.
    InvalidArgument(String),
    /// Error raised by the persistence backend, passed through untouched.
    Database(Box<dyn std::error::Error + Send + Sync>),
    Other(String),
}

impl DataError {
    /// Construct a `Database` variant from any error type.
    ///
    /// Used by backend crates (e.g. `recollect-data-sqlx`) to wrap
    /// driver-specific errors.
    pub fn database(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        DataError::Database(Box::new(err))
    }

    pub(crate) fn configuration(msg: impl Into<String>) -> Self {
        DataError::Configuration(msg.into())
    }

    pub(crate) fn count_unsupported(entity: &str) -> Self {
        DataError::CountUnsupported(format!(
            "the count strategy of '{entity}' does not provide a total count"
        ))
    }

    /// Returns `true` when the error only signals that no count is available.
    pub fn is_count_unsupported(&self) -> bool {
        matches!(self, DataError::CountUnsupported(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DataError::NotFound(_))
    }
}

impl std::fmt::Display for DataError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataError::NotFound(msg) => write!(f, "Not found: {msg}"),
            DataError::Configuration(msg) => write!(f, "Configuration error: {msg}"),
            DataError::CountUnsupported(msg) => write!(f, "Count unsupported: {msg}"),
            DataError::ResultTooLarge { limit, fetched } => write!(
                f,
                "Result too large: fetched {fetched} rows, hard limit is {limit}; narrow the query"
            ),
            DataError::InvalidArgument(msg) => write!(f, "Invalid argument: {msg}"),
            DataError::Database(err) => write!(f, "Database error: {err}"),
            DataError::Other(msg) => write!(f, "Data error: {msg}"),
        }
    }
}

impl std::error::Error for DataError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DataError::Database(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<QueryError> for DataError {
    fn from(err: QueryError) -> Self {
        DataError::InvalidArgument(err.to_string())
    }
}
