//! Error types for DynKG.

use thiserror::Error;

/// Result type alias for DynKG operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in DynKG operations.
#[derive(Error, Debug)]
pub enum Error {
    // Setup errors (fatal, raised before any training work)
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid dataset: {0}")]
    InvalidDataset(String),

    // Recovered locally by the metrics engine
    #[error("Metrics computation failed: {0}")]
    MetricsComputation(String),

    // Model errors
    #[error("Model error: {0}")]
    Model(String),

    #[error("Invalid trainer state: {0}")]
    InvalidState(String),

    // Persistence errors
    #[error("Results table error: {0}")]
    ResultsTable(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }

    /// Whether the error is fatal before training starts.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Error::ResultsTable(err.to_string())
    }
}
