//! Error types for Tally Core.

use crate::config::ConfigError;
use std::path::PathBuf;
use thiserror::Error;

/// Batch-level failures.
///
/// Per-file problems never show up here; they end up in a
/// [`ResultEnvelope`](crate::batch::ResultEnvelope).
#[derive(Error, Debug)]
pub enum TallyError {
    /// An input directory could not be enumerated.
    #[error("Cannot read input {}: {message}", path.display())]
    Input {
        /// Path that failed to enumerate.
        path: PathBuf,
        /// Underlying error.
        message: String,
    },

    /// Batch settings are out of range.
    #[error("Invalid batch configuration: {0}")]
    InvalidBatchConfig(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Report serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for Tally operations.
pub type Result<T> = std::result::Result<T, TallyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tally_error_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let tally_err: TallyError = io_err.into();
        match tally_err {
            TallyError::Io(_) => {}
            _ => panic!("Expected Io error variant"),
        }
    }

    #[test]
    fn test_tally_error_config_conversion() {
        let config_err = ConfigError::InvalidValue("TALLY_RETRIES=abc".to_string());
        let tally_err: TallyError = config_err.into();
        assert_eq!(
            tally_err.to_string(),
            "Configuration error: Invalid configuration value: TALLY_RETRIES=abc"
        );
    }

    #[test]
    fn test_input_error_display() {
        let err = TallyError::Input { path: PathBuf::from("/data"), message: "permission denied".into() };
        assert_eq!(err.to_string(), "Cannot read input /data: permission denied");
    }
}
