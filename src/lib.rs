//! tlsio - TLS transport adapter
//!
//! This crate exposes a uniform, poll-driven I/O contract (open, close, send,
//! dowork, set-option) over a TLS socket primitive so that a protocol client
//! can move bytes over TLS without dealing with certificates, connection
//! retries or partial writes.

pub mod adapter;
pub mod tls;
pub mod xio;

pub use crate::adapter::{TlsIo, TlsIoConfig, TlsIoState};
pub use crate::xio::{IoInterface, OpenResult, SendResult, XioError};
