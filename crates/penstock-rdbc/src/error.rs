//! Error types for penstock-rdbc
//!
//! Everything in this crate resolves at construction time, before any data
//! moves, so these errors are all fail-fast: they surface at dialect
//! lookup, schema resolution, or DDL synthesis, never mid-stream. The one
//! exception is [`Error::TypeCoercion`], which callers are expected to
//! catch at the row boundary and treat as a single-record failure.

use thiserror::Error;

/// Result type for penstock-rdbc operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for penstock-rdbc
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or unknown configuration value
    #[error("configuration error: {message}")]
    Configuration {
        /// What was wrong
        message: String,
    },

    /// A generic type has no native mapping in the selected dialect
    #[error("no native type for `{generic}` in dialect `{dialect}`")]
    TypeMapping {
        /// The generic type that could not be mapped
        generic: String,
        /// The dialect that rejected it
        dialect: String,
    },

    /// A text value could not be interpreted as the declared column type
    #[error("cannot interpret `{value}` as {target}")]
    TypeCoercion {
        /// The offending text
        value: String,
        /// The declared target type
        target: String,
    },

    /// Schema construction or column resolution failed
    #[error("schema error: {message}")]
    Schema {
        /// What was wrong
        message: String,
    },
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a type mapping error
    pub fn type_mapping(generic: impl Into<String>, dialect: impl Into<String>) -> Self {
        Self::TypeMapping {
            generic: generic.into(),
            dialect: dialect.into(),
        }
    }

    /// Create a type coercion error
    pub fn type_coercion(value: impl Into<String>, target: impl Into<String>) -> Self {
        Self::TypeCoercion {
            value: value.into(),
            target: target.into(),
        }
    }

    /// Create a schema error
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    /// Whether this is a row-level coercion failure rather than a
    /// construction-time failure
    pub fn is_coercion(&self) -> bool {
        matches!(self, Self::TypeCoercion { .. })
    }
}
