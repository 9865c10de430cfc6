//! LineSource trait for a unified transport interface
//!
//! This module provides the trait the stream reader pulls lines through,
//! implemented by the real serial port ([`super::SerialLineSource`]) and by the
//! scripted in-memory source used for tests and replay
//! ([`super::ScriptedLineSource`]).

use crate::error::TransportError;
use std::time::Duration;

/// Result of a transport operation
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Restartable source of text lines
///
/// Implementations must be `Send` so the reader can own them on its own
/// thread. A source may be opened again after `close()` or after a read
/// failure.
#[cfg_attr(test, mockall::automock)]
pub trait LineSource: Send {
    /// Acquire the underlying transport
    fn open(&mut self) -> TransportResult<()>;

    /// Read one line, waiting at most `timeout`
    ///
    /// Returns `Ok(None)` when nothing complete arrived in time. The returned
    /// line has its line terminator removed but is otherwise untrimmed.
    fn read_line(&mut self, timeout: Duration) -> TransportResult<Option<String>>;

    /// Release the transport. Closing a closed source is a no-op.
    fn close(&mut self);

    /// Human-readable name of the endpoint, used in logs
    fn describe(&self) -> String;

    /// Ports that could be opened instead, for diagnostics after an open failure
    fn available_ports(&self) -> Vec<String> {
        Vec::new()
    }
}
