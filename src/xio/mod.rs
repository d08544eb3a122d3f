//! Uniform I/O contract for tlsio
//!
//! This module defines the operation table that every transport exposes to
//! the protocol client sitting on top of it.
//!
//! # Architecture
//!
//! The client never talks to a concrete transport directly. It drives any
//! type implementing `IoInterface`:
//!
//! - `open` / `close` request a lifecycle transition
//! - `dowork` advances the transport and delivers inbound bytes
//! - `send` writes a whole buffer synchronously
//! - `set_option` / `retrieve_options` carry named configuration values
//!
//! All completion notifications are delivered through callbacks. Contexts
//! the C-style APIs pass around as opaque pointers are simply captured by
//! the closures.
//!
//! # Examples
//!
//! ```no_run
//! use tlsio::{IoInterface, OpenResult, TlsIo, TlsIoConfig};
//!
//! let config = TlsIoConfig::new("broker.example", 8883);
//! let mut io: TlsIo = TlsIo::create(config).unwrap();
//!
//! io.open(
//!     Box::new(|result: OpenResult| assert_eq!(result, OpenResult::Ok)),
//!     Box::new(|bytes: &[u8]| println!("received {} bytes", bytes.len())),
//!     Box::new(|| eprintln!("transport error")),
//! )
//! .unwrap();
//!
//! loop {
//!     io.dowork();
//! #   break;
//! }
//! ```

pub mod options;

pub use options::{OptionHandler, OptionKind, TlsIoOptions};

use crate::tls::TlsError;

/// Result type for I/O interface operations
pub type Result<T> = std::result::Result<T, XioError>;

/// Outcome reported to the open-complete callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenResult {
    /// Connection established
    Ok,
    /// Open request was rejected synchronously
    Error,
    /// Connect attempts were exhausted before the connection came up
    Cancelled,
}

/// Outcome reported to the send-complete callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendResult {
    /// Whole buffer was written
    Ok,
    /// A write transmitted nothing; the remainder was abandoned
    Error,
}

/// Called once when an open request resolves
pub type OnOpenComplete = Box<dyn FnMut(OpenResult)>;

/// Called for every non-empty chunk read while the connection is open
pub type OnBytesReceived = Box<dyn FnMut(&[u8])>;

/// Called when the transport enters its error state
pub type OnIoError = Box<dyn FnMut()>;

/// Called once when a close request completes
pub type OnCloseComplete = Box<dyn FnMut()>;

/// Called once when a send finishes, successfully or not
pub type OnSendComplete = Box<dyn FnOnce(SendResult)>;

/// I/O interface errors
#[derive(Debug, thiserror::Error)]
pub enum XioError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Operation {operation} not valid in state {state}")]
    InvalidState {
        state: &'static str,
        operation: &'static str,
    },

    #[error("Out of memory allocating {0}")]
    OutOfMemory(&'static str),

    #[error("Option not supported: {0}")]
    NotSupported(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TlsError),
}

/// Interface description
///
/// The fixed set of operations a transport offers to its owning client.
/// Any type implementing this trait can be substituted for another without
/// the client noticing.
///
/// Implementations are single-threaded and non-reentrant: callbacks run
/// synchronously inside these calls and must not call back into `open`,
/// `close` or `destroy`.
pub trait IoInterface {
    /// Parameters accepted by `create`
    type Config;

    /// Allocate a transport in its closed state
    fn create(config: Self::Config) -> Result<Self>
    where
        Self: Sized;

    /// Release the transport and everything it owns
    fn destroy(self)
    where
        Self: Sized;

    /// Request the connection to be opened
    ///
    /// `on_open_complete` fires once the request resolves; `on_bytes_received`
    /// and `on_io_error` stay registered for the life of the connection.
    fn open(
        &mut self,
        on_open_complete: OnOpenComplete,
        on_bytes_received: OnBytesReceived,
        on_io_error: OnIoError,
    ) -> Result<()>;

    /// Request the connection to be closed
    fn close(&mut self, on_close_complete: Option<OnCloseComplete>) -> Result<()>;

    /// Write the whole buffer before returning
    fn send(&mut self, buffer: &[u8], on_send_complete: Option<OnSendComplete>) -> Result<()>;

    /// Advance the transport state machine by one step
    fn dowork(&mut self);

    /// Set a named option
    fn set_option(&mut self, name: &str, value: &str) -> Result<()>;

    /// Snapshot every option currently set
    fn retrieve_options(&self) -> Result<OptionHandler>;
}

/// Take an owned copy of a caller string, reporting allocation failure
/// instead of aborting.
pub(crate) fn copy_str(value: &str, what: &'static str) -> Result<String> {
    let mut copy = String::new();
    copy.try_reserve_exact(value.len())
        .map_err(|_| XioError::OutOfMemory(what))?;
    copy.push_str(value);
    Ok(copy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_str_is_independent() {
        let mut source = String::from("broker.example");
        let copy = copy_str(&source, "hostname").unwrap();
        source.clear();

        assert_eq!(copy, "broker.example");
    }

    #[test]
    fn test_error_display() {
        let err = XioError::InvalidState {
            state: "OPENING",
            operation: "open",
        };
        assert_eq!(err.to_string(), "Operation open not valid in state OPENING");

        let err = XioError::OutOfMemory("trusted certificate");
        assert!(err.to_string().contains("trusted certificate"));
    }
}
