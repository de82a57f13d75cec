//! Error taxonomy for per-file batch outcomes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a file ended the batch in the `Error` state.
///
/// Every variant is terminal for the file it is attached to; none of them is
/// ever fatal to the batch as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The input path does not exist or cannot be read.
    FileNotFound,
    /// No handler is registered for the file's extension.
    UnsupportedType,
    /// The file's syntax could not be parsed (CSV, JSON or log lines).
    ParseError,
    /// The file parsed but its shape is not what the handler expects.
    MalformedInput,
    /// A handler attempt, or the whole retry budget, ran out of time.
    Timeout,
    /// The coordinator stopped waiting for the worker's result.
    WorkerTimeout,
    /// Every allowed attempt failed.
    RetryExhausted,
    /// The batch was cancelled before this file finished.
    BatchCancelled,
    /// The handler panicked while processing the file.
    HandlerPanicked,
}

impl ErrorKind {
    /// Whether a failed attempt with this kind is followed by another one.
    ///
    /// Every handler failure is retried, including a missing file that may
    /// appear between attempts. `UnsupportedType` is decided at dispatch and
    /// never reaches a handler.
    pub fn is_retryable(self) -> bool {
        !matches!(self, ErrorKind::UnsupportedType | ErrorKind::BatchCancelled)
    }

    /// Stable identifier used in reports.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::FileNotFound => "FileNotFound",
            ErrorKind::UnsupportedType => "UnsupportedType",
            ErrorKind::ParseError => "ParseError",
            ErrorKind::MalformedInput => "MalformedInput",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::WorkerTimeout => "WorkerTimeout",
            ErrorKind::RetryExhausted => "RetryExhausted",
            ErrorKind::BatchCancelled => "BatchCancelled",
            ErrorKind::HandlerPanicked => "HandlerPanicked",
        }
    }

    /// Human-readable reason shown when an envelope carries no message.
    pub fn description(self) -> &'static str {
        match self {
            ErrorKind::FileNotFound => "file not found",
            ErrorKind::UnsupportedType => "unsupported file type",
            ErrorKind::ParseError => "could not parse file",
            ErrorKind::MalformedInput => "file content is malformed",
            ErrorKind::Timeout => "processing timed out",
            ErrorKind::WorkerTimeout => "worker did not report in time",
            ErrorKind::RetryExhausted => "all retry attempts failed",
            ErrorKind::BatchCancelled => "batch was cancelled",
            ErrorKind::HandlerPanicked => "handler crashed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(ErrorKind::ParseError.is_retryable());
        assert!(ErrorKind::Timeout.is_retryable());
        assert!(ErrorKind::HandlerPanicked.is_retryable());
        assert!(ErrorKind::FileNotFound.is_retryable());
        assert!(!ErrorKind::BatchCancelled.is_retryable());
        assert!(!ErrorKind::UnsupportedType.is_retryable());
    }

    #[test]
    fn test_display_matches_serialized_name() {
        let json = serde_json::to_string(&ErrorKind::RetryExhausted).unwrap();
        assert_eq!(json, format!("\"{}\"", ErrorKind::RetryExhausted));
    }
}
