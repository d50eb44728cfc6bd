use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Unsupported interval/aggregation names, invalid field names, bad ranges or settings.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Upstream fetch failure, passed through untouched.
    #[error(transparent)]
    DataSource(#[from] DataSourceError),
    /// Internal fault caught at the operation boundary. Details are logged, not returned.
    #[error("computation failed in '{operation}'")]
    Computation { operation: String },
}

impl EngineError {
    pub fn config(message: impl Into<String>) -> Self {
        EngineError::Configuration(message.into())
    }

    pub fn computation(operation: impl Into<String>) -> Self {
        EngineError::Computation {
            operation: operation.into(),
        }
    }
}

/// Failure reported by a `DataSource` implementation.
#[derive(Debug, Error)]
pub enum DataSourceError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("data source unavailable: {0}")]
    Unavailable(String),
}

/// An unreadable cache entry. Never leaves the cache layer; it becomes a miss.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache entry '{key}' could not be decoded: {reason}")]
    Corrupted { key: String, reason: String },
    #[error("cache entry '{key}' could not be encoded: {reason}")]
    Unencodable { key: String, reason: String },
}
