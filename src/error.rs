//! Error types for meld.

use thiserror::Error;

/// Result type for meld operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for meld operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Error from the core data model.
    #[error(transparent)]
    Core(#[from] meld_core::Error),

    /// A feature value or score was NaN or infinite.
    ///
    /// Fatal to the document being searched, never to the whole run.
    #[error("Numeric anomaly in {context}: {value}")]
    NumericAnomaly {
        /// Where the value was observed.
        context: String,
        /// The offending value.
        value: f64,
    },

    /// Invalid run configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation not supported by the selected strategy.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parse error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Create a numeric anomaly error.
    pub fn numeric_anomaly(context: impl Into<String>, value: f64) -> Self {
        Error::NumericAnomaly {
            context: context.into(),
            value,
        }
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create an unsupported-operation error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Error::Unsupported(msg.into())
    }

    /// True for errors that only invalidate one document's search.
    #[must_use]
    pub fn is_document_local(&self) -> bool {
        matches!(self, Error::NumericAnomaly { .. } | Error::Core(_))
    }
}
