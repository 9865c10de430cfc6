//! Error handling for serialvis
//!
//! This module defines the error types used across the pipeline and a
//! Result alias for crate-level operations.
//!
//! The taxonomy mirrors how each failure is recovered:
//!
//! - [`TransportError`] - open/read failures on the serial link. Recovered by
//!   the reader's reconnect loop, fatal when auto-reconnect is disabled.
//! - [`DecodeError`] - a malformed HDR/DAT line. Always recovered locally by
//!   dropping the line.
//! - [`StreamError`] - crate-level error wrapping transport failures plus
//!   configuration and persistence failures.

use thiserror::Error;

/// Failures on the physical link
#[derive(Error, Debug)]
pub enum TransportError {
    /// The port could not be opened
    #[error("failed to open {port}: {message}")]
    Open { port: String, message: String },

    /// A read on an open port failed
    #[error("read failed: {0}")]
    Read(String),

    /// Underlying IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Read attempted while no connection is open
    #[error("transport is not open")]
    Closed,
}

impl From<serialport::Error> for TransportError {
    fn from(err: serialport::Error) -> Self {
        TransportError::Read(err.to_string())
    }
}

/// A line that looked like an HDR/DAT record but could not be decoded
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// DAT line with fewer than the three mandatory tokens
    #[error("data line has {0} tokens, expected at least 3")]
    TooFewTokens(usize),

    /// Source sequence token is not numeric
    #[error("invalid source sequence: {0:?}")]
    BadSequence(String),

    /// Timestamp token is not numeric
    #[error("invalid timestamp: {0:?}")]
    BadTimestamp(String),

    /// A value token is neither empty nor a float
    #[error("invalid value at position {index}: {token:?}")]
    BadValue { index: usize, token: String },
}

/// Main error type for serialvis operations
#[derive(Error, Debug)]
pub enum StreamError {
    /// Errors from the serial link
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Errors writing the CSV log
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors related to channel communication
    #[error("Channel error: {0}")]
    Channel(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<StreamError>,
    },
}

impl StreamError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        StreamError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Whether this error originated on the transport
    pub fn is_transport(&self) -> bool {
        match self {
            StreamError::Transport(_) => true,
            StreamError::WithContext { source, .. } => source.is_transport(),
            _ => false,
        }
    }
}

/// Result type alias for serialvis operations
pub type Result<T> = std::result::Result<T, StreamError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, TransportError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| StreamError::from(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| StreamError::from(e).with_context(f()))
    }
}
