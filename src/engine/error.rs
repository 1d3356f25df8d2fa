//! Hydrate Error Types

use thiserror::Error;

use super::config::ConfigError;
use super::value::StorageType;

#[derive(Error, Debug)]
pub enum HydrateError {
    #[error("Output {destination} can not be bound: {reason}")]
    Binding {
        destination: &'static str,
        reason: String,
    },

    #[error("Invalid descriptor for {entity}: {reason}")]
    Descriptor {
        entity: &'static str,
        reason: String,
    },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Query execution failed: {0}")]
    Execution(String),

    #[error("Failed to scan {entity}.{column}: {source}")]
    Scan {
        entity: &'static str,
        column: &'static str,
        #[source]
        source: ConversionError,
    },

    #[error("Run was cancelled")]
    Cancelled,

    #[error("Run deadline exceeded")]
    DeadlineExceeded,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl HydrateError {
    /// True for errors raised while binding outputs, before any SQL runs.
    pub fn is_binding(&self) -> bool {
        matches!(self, HydrateError::Binding { .. } | HydrateError::Descriptor { .. })
    }

    pub fn is_execution(&self) -> bool {
        matches!(
            self,
            HydrateError::Sqlite(_) | HydrateError::Pool(_) | HydrateError::Execution(_)
        )
    }

    pub fn is_scan(&self) -> bool {
        matches!(self, HydrateError::Scan { .. })
    }
}

/// Failure converting a column value into a declared storage or field type.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConversionError {
    #[error("cannot convert {found} into {expected}")]
    Incompatible {
        expected: StorageType,
        found: &'static str,
    },

    #[error("cannot parse {value:?} as {expected}")]
    Unparseable {
        expected: StorageType,
        value: String,
    },

    #[error("value {value} is out of range for {target}")]
    OutOfRange { value: String, target: &'static str },

    #[error("unexpected NULL for a non-nullable field")]
    UnexpectedNull,
}

pub type Result<T> = std::result::Result<T, HydrateError>;
