//! Unified error type for the sync layer.
//!
//! The variants mirror the failure taxonomy the retry layer reasons about:
//! transport-level failures (`Timeout`, `NetworkUnavailable`), HTTP status
//! failures, undecodable bodies, and well-formed application rejections.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    #[error("API returned HTTP {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("JSON decode error: {0}")]
    Decode(String),

    #[error("API rejected request: {0}")]
    Application(String),

    #[error("Auth error: {0}")]
    Auth(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Unknown resource: {0}")]
    UnknownResource(String),

    #[error("Fetcher stopped before the result could be applied")]
    Stopped,

    #[error("IO error: {0}")]
    Io(String),

    #[error("{0}")]
    Other(String),
}

/// Coarse classification of an [`Error`], used as a retry key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Timeout,
    NetworkUnavailable,
    HttpStatus,
    Decode,
    Application,
    Other,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::NetworkUnavailable(_) => ErrorKind::NetworkUnavailable,
            Error::HttpStatus { .. } => ErrorKind::HttpStatus,
            Error::Decode(_) => ErrorKind::Decode,
            Error::Application(_) => ErrorKind::Application,
            _ => ErrorKind::Other,
        }
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Decode(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}
