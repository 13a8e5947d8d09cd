//! Error types for the mapping layer
//!
//! Every fallible operation in cqlmap returns [`MapperResult`]. Store failures
//! are passed through opaquely; everything else carries enough structure for
//! the caller to decide on retry or compensation.

use thiserror::Error;

/// Result type for mapping operations
pub type MapperResult<T> = Result<T, MapperError>;

/// Boxed store-side failure
pub type StoreSource = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while building, executing or scanning statements
#[derive(Debug, Error)]
pub enum MapperError {
    /// Schema extraction was given something other than a record type
    #[error("Invalid type: {type_name} - {reason}")]
    InvalidType { type_name: String, reason: String },

    /// Pagination token could not be decoded
    #[error("Bad cursor: {0}")]
    BadCursor(String),

    /// Identifier or record shape does not match the schema
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Failure reported by the session (acquire, execute or scan)
    #[error("Store error: {0}")]
    Store(#[source] StoreSource),

    /// Some items of a batch failed; indices refer to the caller's input
    #[error("Partial batch failure: {} succeeded, {} failed ({cause})", .succeeded.len(), .failed.len())]
    PartialBatchFailure {
        succeeded: Vec<usize>,
        failed: Vec<usize>,
        cause: Box<MapperError>,
    },

    /// The row was not at `expected`, the version the write was conditioned on
    #[error("Version conflict on {table}: expected version {expected}{}", .found.as_ref().map(|v| format!(", found {v}")).unwrap_or_default())]
    VersionConflict {
        table: String,
        expected: i64,
        found: Option<i64>,
    },

    /// A value could not be converted to or from its column representation
    #[error("Conversion error: {message}{}", .field.as_ref().map(|f| format!(" (field: {f})")).unwrap_or_default())]
    Conversion {
        message: String,
        field: Option<String>,
    },

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Local I/O failure, such as an export sink refusing a write
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MapperError {
    /// Create an invalid type error
    pub fn invalid_type<S: Into<String>, R: Into<String>>(type_name: S, reason: R) -> Self {
        MapperError::InvalidType {
            type_name: type_name.into(),
            reason: reason.into(),
        }
    }

    /// Create a schema mismatch error
    pub fn schema_mismatch<S: Into<String>>(msg: S) -> Self {
        MapperError::SchemaMismatch(msg.into())
    }

    /// Wrap any store-side error
    pub fn store<E: Into<StoreSource>>(err: E) -> Self {
        MapperError::Store(err.into())
    }

    /// Create a conversion error without field context
    pub fn conversion<S: Into<String>>(msg: S) -> Self {
        MapperError::Conversion {
            message: msg.into(),
            field: None,
        }
    }

    /// Attach the field name to a conversion error; other variants pass through
    pub fn in_field(self, field: &str) -> Self {
        match self {
            MapperError::Conversion { message, .. } => MapperError::Conversion {
                message,
                field: Some(field.to_string()),
            },
            other => other,
        }
    }

    /// Indices that failed, for batch errors
    pub fn failed_indices(&self) -> &[usize] {
        match self {
            MapperError::PartialBatchFailure { failed, .. } => failed,
            _ => &[],
        }
    }
}

impl From<serde_json::Error> for MapperError {
    fn from(err: serde_json::Error) -> Self {
        MapperError::Conversion {
            message: err.to_string(),
            field: None,
        }
    }
}

impl From<toml::de::Error> for MapperError {
    fn from(err: toml::de::Error) -> Self {
        MapperError::Configuration(err.to_string())
    }
}
