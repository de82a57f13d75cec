//! Errors reported by format handlers.

use crate::batch::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A handler's reason for rejecting a file.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HandlerError {
    /// The file does not exist.
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The file exists but could not be read.
    #[error("failed to read {}: {message}", path.display())]
    Unreadable {
        /// File that failed to read.
        path: PathBuf,
        /// Underlying I/O error.
        message: String,
    },

    /// No handler understands the file extension.
    #[error("unsupported file type: {0}")]
    UnsupportedType(String),

    /// Syntax error in the file content.
    #[error("{0}")]
    Parse(String),

    /// Well-formed content with the wrong shape.
    #[error("{0}")]
    Malformed(String),
}

impl HandlerError {
    /// Map onto the per-file error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            HandlerError::NotFound(_) | HandlerError::Unreadable { .. } => ErrorKind::FileNotFound,
            HandlerError::UnsupportedType(_) => ErrorKind::UnsupportedType,
            HandlerError::Parse(_) => ErrorKind::ParseError,
            HandlerError::Malformed(_) => ErrorKind::MalformedInput,
        }
    }

    pub(crate) fn from_io(path: &Path, err: &std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => HandlerError::NotFound(path.to_path_buf()),
            std::io::ErrorKind::InvalidData => {
                HandlerError::Parse(format!("{} is not valid UTF-8", path.display()))
            }
            _ => HandlerError::Unreadable { path: path.to_path_buf(), message: err.to_string() },
        }
    }
}
