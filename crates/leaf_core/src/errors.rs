//! Error types for the leaf encoder

use thiserror::Error;

/// Errors that can occur while loading ensembles or encoding rows
#[derive(Error, Debug)]
pub enum EncoderError {
    /// Tree arrays are inconsistent or describe something that is not a tree
    #[error("Malformed tree structure: {0}")]
    Structural(String),

    /// Feature names, row widths or settings do not match the ensemble
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// `transform` was called before `fit`
    #[error("Encoder is not fitted; call fit() before transform()")]
    NotFitted,

    /// A leaf name was not part of the categories learned during fit
    #[error("Unknown category {value:?} in column {column}")]
    UnknownCategory { column: usize, value: String },

    /// Matrix dimensions differ from what was learned during fit
    #[error("Shape mismatch: expected {expected} columns, got {actual}")]
    Shape { expected: usize, actual: usize },

    /// Persisted state was produced from a different ensemble
    #[error("Encoder state does not match ensemble: expected hash {expected}, got {actual}")]
    StateMismatch { expected: String, actual: String },

    /// Config file could not be parsed or written
    #[error("Config error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for encoder operations
pub type Result<T> = std::result::Result<T, EncoderError>;
