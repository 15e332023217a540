//! Error types and Result alias.

use std::fmt;
use std::io;

/// Broad classification of failures surfaced to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Unknown table or column, incompatible index kind, duplicate definition
    Schema,
    /// Value not representable in the declared field type
    Encoding,
    /// Operation the chosen index cannot perform (e.g. range scan on HASH)
    Unsupported,
    /// Underlying file I/O failure
    Io,
    /// On-disk structure damaged or inconsistent
    Corrupt,
    /// Invariant violation that should be unreachable
    Internal,
}

impl ErrorCode {
    /// Short human-readable name for the code
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Schema => "schema error",
            ErrorCode::Encoding => "encoding error",
            ErrorCode::Unsupported => "unsupported operation",
            ErrorCode::Io => "i/o error",
            ErrorCode::Corrupt => "corrupt structure",
            ErrorCode::Internal => "internal error",
        }
    }
}

/// Error carrying a code and an optional detail message
#[derive(Debug)]
pub struct Error {
    code: ErrorCode,
    message: Option<String>,
}

impl Error {
    /// Create an error with no detail message
    pub fn new(code: ErrorCode) -> Self {
        Error {
            code,
            message: None,
        }
    }

    /// Create an error with a detail message
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Error {
            code,
            message: Some(message.into()),
        }
    }

    /// The error's classification
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// The detail message, if one was attached
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(msg) => write!(f, "{}: {}", self.code.as_str(), msg),
            None => write!(f, "{}", self.code.as_str()),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::with_message(ErrorCode::Io, err.to_string())
    }
}

/// Result type alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_with_and_without_message() {
        let bare = Error::new(ErrorCode::Corrupt);
        assert_eq!(bare.to_string(), "corrupt structure");

        let detailed = Error::with_message(ErrorCode::Schema, "no such table: ventas");
        assert_eq!(detailed.to_string(), "schema error: no such table: ventas");
    }

    #[test]
    fn test_io_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "gone");
        let err: Error = io_err.into();
        assert_eq!(err.code(), ErrorCode::Io);
        assert!(err.message().unwrap().contains("gone"));
    }
}
