//! Error types for nirnet-rs.

use thiserror::Error;

/// Result type alias for nirnet-rs operations.
pub type Result<T> = std::result::Result<T, NirnetError>;

/// Errors that can occur in nirnet-rs.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum NirnetError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid configuration file.
    #[error("invalid config file: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// Input table error (missing columns, non-numeric cells).
    #[error("input error: {0}")]
    Input(String),

    /// Preprocessing error.
    #[error("preprocess error: {0}")]
    Preprocess(String),

    /// Model construction or forward-pass error.
    #[error("model error: {0}")]
    Model(String),

    /// Training error.
    #[error("training error: {0}")]
    Training(String),

    /// Checkpoint error.
    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    /// Feature-importance analysis error.
    #[error("importance error: {0}")]
    Importance(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// Candle error.
    #[error("candle error: {0}")]
    Candle(#[from] candle_core::Error),
}
