//! TLS socket primitive
//!
//! This module holds the narrow, synchronous TLS primitive the adapter is
//! built on: connect, read, write and close over a host/port pair, driven
//! by an `SslConfig` record.
//!
//! # Architecture
//!
//! 1. `SslConfig` describes how to connect (versions, verification, CA and
//!    client certificates)
//! 2. `SslSocket` is the primitive's contract; every call is bounded by a
//!    per-call timeout
//! 3. `OpenSslSocket` implements it with OpenSSL over a `socket2` TCP
//!    connection
//!
//! The adapter in `crate::adapter` owns one `SslSocket` and never touches
//! OpenSSL directly, so tests can substitute a scripted primitive.
//!
//! # Examples
//!
//! ```no_run
//! use tlsio::tls::{OpenSslSocket, SslConfig, SslSocket, TlsVersion};
//! use std::time::Duration;
//!
//! let mut config = SslConfig::default();
//! config.min_version = TlsVersion::Tls12;
//! config.max_version = TlsVersion::Tls13;
//!
//! let mut socket = OpenSslSocket::new();
//! socket.connect(&config, "broker.example", 8883).unwrap();
//! socket.write(b"ping", Duration::from_secs(5)).unwrap();
//! ```

pub mod cert;
pub mod config;
pub mod socket;

pub use cert::CertInfo;
pub use config::{SslConfig, TlsError, TlsVersion, VerifyMode};
pub use socket::{OpenSslSocket, SslSocket};

/// Result type for TLS operations
pub type Result<T> = std::result::Result<T, TlsError>;
