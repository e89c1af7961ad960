//! Error types for dimload-core

use thiserror::Error;

/// Result type alias for dimload-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in dimload-core
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file could not be found
    #[error("configuration file not found: {path}")]
    ConfigNotFound {
        /// Path that was searched
        path: String,
    },

    /// Failed to parse YAML configuration
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// Invalid configuration value
    #[error("invalid configuration: {message}")]
    ConfigInvalid {
        /// Description of what's invalid
        message: String,
    },

    /// Template rendering error while expanding the configuration file
    #[error("template error: {0}")]
    TemplateError(#[from] minijinja::Error),

    /// Reading from the source system failed
    #[error("source extraction '{extract}' failed: {message}")]
    Source {
        /// Name of the extraction (products, vendors, purchase_lines)
        extract: String,
        /// Description of the error
        message: String,
    },

    /// Reading from or writing to the warehouse failed
    #[error("warehouse table '{table}' error: {message}")]
    Warehouse {
        /// Destination table
        table: String,
        /// Description of the error
        message: String,
    },

    /// A dimension extract carried the same natural key twice
    #[error("duplicate natural key {key} in '{table}'")]
    DuplicateNaturalKey {
        /// Destination table
        table: String,
        /// Offending natural key
        key: i32,
    },

    /// A fact row references a natural key missing from a dimension
    #[error("order {order_id}: no row in '{table}' for natural key {key}")]
    LookupMiss {
        /// Dimension table that was searched
        table: String,
        /// Natural key that did not resolve
        key: i32,
        /// Purchase order of the offending line
        order_id: i32,
    },

    /// A purchase line has no ordered quantity to spread the freight over
    #[error("order {order_id}: ordered quantity is zero, freight per unit is undefined")]
    ZeroQuantity {
        /// Purchase order of the offending line
        order_id: i32,
    },

    /// A purchase line carries a date the time dimension does not cover
    #[error("order {order_id}: date {date} is outside the calendar ({start} to {end})")]
    DateOutOfRange {
        /// Purchase order of the offending line
        order_id: i32,
        /// Date that has no `dim_time` row
        date: chrono::NaiveDate,
        /// First calendar day
        start: chrono::NaiveDate,
        /// Last calendar day
        end: chrono::NaiveDate,
    },

    /// The fact unit ran before a dimension it reads was loaded
    #[error("dimension '{table}' is empty; load it before the fact table")]
    DimensionNotLoaded {
        /// Dimension table that was empty
        table: String,
    },

    /// Task graph declaration error
    #[error("invalid task graph: {message}")]
    InvalidGraph {
        /// Description of the error
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Build a source extraction error
    pub fn source(extract: impl Into<String>, message: impl ToString) -> Self {
        Self::Source {
            extract: extract.into(),
            message: message.to_string(),
        }
    }

    /// Build a warehouse error for the given table
    pub fn warehouse(table: impl Into<String>, message: impl ToString) -> Self {
        Self::Warehouse {
            table: table.into(),
            message: message.to_string(),
        }
    }
}
