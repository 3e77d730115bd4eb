//! Error types for the `push` crate.
//!
//! Follows the same pattern as domain::error with a root Error struct and an error kind enum.
//! None of these errors ever reach an HTTP caller: the relay either swallows them
//! (credentials, connect) or hands them to the background task runner (send).

use std::error::Error as StdError;
use std::fmt;

/// Top-level error type for the push relay.
/// Holds error kind and optional source for error chaining.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

/// Major categories of errors in the push relay.
#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    /// Relay settings are missing or unusable.
    Config,
    /// The token request could not be built or sent.
    Credentials,
    /// Opening the broker connection or completing the hub handshake failed.
    Connect,
    /// Writing to an established broker connection failed.
    Send,
    /// A hub protocol record could not be encoded or decoded.
    Protocol,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "Push relay error ({:?}): {}", self.error_kind, source),
            None => write!(f, "Push relay error ({:?})", self.error_kind),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let error_kind = if err.is_builder() {
            ErrorKind::Config
        } else {
            ErrorKind::Credentials
        };

        Error {
            source: Some(Box::new(err)),
            error_kind,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Protocol,
        }
    }
}

/// Helper function to create an error of the given kind from a message.
pub fn error(kind: ErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: kind,
    }
}

/// Helper function to wrap a WebSocket transport error.
pub(crate) fn transport_error(kind: ErrorKind, err: tokio_tungstenite::tungstenite::Error) -> Error {
    Error {
        source: Some(Box::new(err)),
        error_kind: kind,
    }
}
