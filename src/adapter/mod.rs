//! TLS transport adapter
//!
//! `TlsIo` implements the `IoInterface` contract over an `SslSocket`. It has
//! no threads of its own; all progress happens inside calls made by the
//! owning client, mostly `dowork`.
//!
//! # State Machine
//!
//! ```text
//!            open                 connect ok
//! ┌────────┐ ─────> ┌─────────┐ ────────────> ┌──────┐
//! │ Closed │        │ Opening │               │ Open │ <── dowork drains reads
//! └────────┘        └─────────┘               └──────┘
//!     ^                  │ retries exhausted      │ close
//!     │                  v                        v
//!     │             ┌───────┐  retries       ┌─────────┐
//!     │             │ Error │ <───────────── │ Closing │
//!     │             └───────┘  exhausted     └─────────┘
//!     │   close         │                         │ close ok
//!     └─────────────────┴─────────────────────────┘
//! ```
//!
//! Connect and close attempts are bounded: entering Opening or Closing arms
//! a counter of `MAX_TLS_OPENING_RETRY` / `MAX_TLS_CLOSING_RETRY`, each poll
//! consumes one, and a poll that finds the counter already negative moves
//! the adapter to Error instead of trying again.

pub mod config;

pub use config::TlsIoConfig;

use crate::tls::{OpenSslSocket, SslConfig, SslSocket, TlsError};
use crate::xio::options::{OptionKind, OPTION_TRUSTED_CERT};
use crate::xio::{
    copy_str, IoInterface, OnBytesReceived, OnCloseComplete, OnIoError, OnOpenComplete,
    OnSendComplete, OpenResult, OptionHandler, Result, SendResult, TlsIoOptions, XioError,
};
use config::MAX_VALID_PORT;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Connect attempts armed by `open`
pub const MAX_TLS_OPENING_RETRY: i32 = 10;

/// Close attempts armed by `close`
pub const MAX_TLS_CLOSING_RETRY: i32 = 10;

/// Size of the buffer used for each read in `dowork`
pub const RECEIVE_BUFFER_SIZE: usize = 128;

/// Options accepted besides `TrustedCerts`
const SUPPORTED_OPTIONS: &[OptionKind] = &[OptionKind::X509Cert, OptionKind::X509Key];

/// Adapter state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsIoState {
    Opening,
    Open,
    Closing,
    Closed,
    Error,
}

impl TlsIoState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TlsIoState::Opening => "OPENING",
            TlsIoState::Open => "OPEN",
            TlsIoState::Closing => "CLOSING",
            TlsIoState::Closed => "CLOSED",
            TlsIoState::Error => "ERROR",
        }
    }
}

/// TLS transport adapter
///
/// Owns its target, TLS configuration, trusted certificate and callbacks
/// for its entire lifetime. Values handed in by the caller are copied, so
/// the caller's buffers can be reused as soon as a call returns.
pub struct TlsIo<S: SslSocket = OpenSslSocket> {
    socket: S,
    hostname: String,
    port: u16,
    config: SslConfig,
    trusted_certificate: Option<String>,
    options: TlsIoOptions,
    state: TlsIoState,
    retries_remaining: i32,
    write_timeout: Duration,
    read_timeout: Duration,
    on_open_complete: Option<OnOpenComplete>,
    on_bytes_received: Option<OnBytesReceived>,
    on_io_error: Option<OnIoError>,
    on_close_complete: Option<OnCloseComplete>,
}

impl<S: SslSocket> TlsIo<S> {
    /// Create an adapter over a caller-supplied socket primitive
    pub fn with_socket(config: TlsIoConfig, socket: S) -> Result<Self> {
        if config.hostname.is_empty() {
            error!("Invalid TLS parameters: empty hostname");
            return Err(XioError::InvalidArgument("hostname is empty".to_string()));
        }
        if !(0..=MAX_VALID_PORT).contains(&config.port) {
            error!(port = config.port, "Invalid TLS parameters: port out of range");
            return Err(XioError::InvalidArgument(format!(
                "port {} out of range",
                config.port
            )));
        }
        let port = config.port as u16;

        let hostname = copy_str(&config.hostname, "hostname")?;
        let trusted_certificate = match config.trusted_certs {
            Some(ref pem) => Some(copy_str(pem, "trusted certificate")?),
            None => None,
        };

        debug!(host = %hostname, port, "TLS adapter created");

        Ok(TlsIo {
            socket,
            hostname,
            port,
            config: config.ssl_config(),
            trusted_certificate,
            options: TlsIoOptions::new(SUPPORTED_OPTIONS),
            state: TlsIoState::Closed,
            retries_remaining: 0,
            write_timeout: config.io_timeout,
            read_timeout: config.read_timeout,
            on_open_complete: None,
            on_bytes_received: None,
            on_io_error: None,
            on_close_complete: None,
        })
    }

    /// Current state
    pub fn state(&self) -> TlsIoState {
        self.state
    }

    /// Attempts left in the current Opening or Closing phase
    ///
    /// Meaningless in any other state.
    pub fn retries_remaining(&self) -> i32 {
        self.retries_remaining
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Trusted certificate installed through `TrustedCerts`
    pub fn trusted_certificate(&self) -> Option<&str> {
        self.trusted_certificate.as_deref()
    }

    /// TLS configuration used for the most recent connect attempt
    pub fn ssl_config(&self) -> &SslConfig {
        &self.config
    }

    /// Get reference to the underlying socket primitive
    pub fn socket(&self) -> &S {
        &self.socket
    }

    /// Get mutable reference to the underlying socket primitive
    pub fn socket_mut(&mut self) -> &mut S {
        &mut self.socket
    }

    fn invalid_state(&self, operation: &'static str) -> XioError {
        XioError::InvalidState {
            state: self.state.as_str(),
            operation,
        }
    }

    fn notify_open(&mut self, result: OpenResult) {
        if let Some(ref mut callback) = self.on_open_complete {
            callback(result);
        }
    }

    fn notify_error(&mut self) {
        if let Some(ref mut callback) = self.on_io_error {
            callback();
        }
    }

    fn notify_close(&mut self) {
        if let Some(ref mut callback) = self.on_close_complete {
            callback();
        }
    }

    /// Copy the certificate material into the connect configuration
    fn refresh_ssl_config(&mut self) {
        self.config.ca_cert.clone_from(&self.trusted_certificate);
        self.config.client_cert = self.options.x509_cert().map(str::to_string);
        self.config.client_key = self.options.x509_key().map(str::to_string);
    }

    fn step_opening(&mut self) {
        let attempt = self.retries_remaining;
        self.retries_remaining -= 1;

        if attempt < 0 {
            self.state = TlsIoState::Error;
            error!(host = %self.hostname, port = self.port, "Timeout for TLS connect");
            self.notify_open(OpenResult::Cancelled);
            self.notify_error();
            return;
        }

        self.refresh_ssl_config();
        match self.socket.connect(&self.config, &self.hostname, self.port) {
            Ok(()) => {
                self.state = TlsIoState::Open;
                info!(host = %self.hostname, port = self.port, "TLS connection open");
                self.notify_open(OpenResult::Ok);
            }
            Err(e) => {
                warn!(
                    host = %self.hostname,
                    port = self.port,
                    retries_remaining = self.retries_remaining,
                    error = %e,
                    "TLS connect attempt failed"
                );
            }
        }
    }

    fn step_closing(&mut self) {
        let attempt = self.retries_remaining;
        self.retries_remaining -= 1;

        if attempt < 0 {
            self.state = TlsIoState::Error;
            error!(host = %self.hostname, port = self.port, "Timeout for TLS close");
            self.notify_error();
            return;
        }

        match self.socket.close() {
            Ok(()) => {
                self.state = TlsIoState::Closed;
                info!(host = %self.hostname, port = self.port, "TLS connection closed");
                self.notify_close();
            }
            Err(e) => {
                warn!(
                    retries_remaining = self.retries_remaining,
                    error = %e,
                    "TLS close attempt failed"
                );
            }
        }
    }

    fn drain_reads(&mut self) {
        let mut buffer = [0u8; RECEIVE_BUFFER_SIZE];

        loop {
            match self.socket.read(&mut buffer, self.read_timeout) {
                Ok(0) => break,
                Ok(received) => {
                    trace!(received, "TLS bytes received");
                    if let Some(ref mut callback) = self.on_bytes_received {
                        callback(&buffer[..received]);
                    }
                }
                // TODO: report persistent read failures (peer reset, close_notify)
                // through on_io_error instead of treating them as an idle tick.
                Err(e) => {
                    debug!(error = %e, "TLS read failed, treating as no data");
                    break;
                }
            }
        }
    }
}

impl<S: SslSocket + Default> IoInterface for TlsIo<S> {
    type Config = TlsIoConfig;

    fn create(config: TlsIoConfig) -> Result<Self> {
        Self::with_socket(config, S::default())
    }

    fn destroy(self) {
        trace!(host = %self.hostname, "Destroying TLS adapter");
    }

    fn open(
        &mut self,
        mut on_open_complete: OnOpenComplete,
        on_bytes_received: OnBytesReceived,
        mut on_io_error: OnIoError,
    ) -> Result<()> {
        if self.state != TlsIoState::Closed {
            error!(
                state = self.state.as_str(),
                "Invalid tlsio_state. Expected state is CLOSED"
            );
            on_open_complete(OpenResult::Error);
            on_io_error();
            return Err(self.invalid_state("open"));
        }

        self.on_open_complete = Some(on_open_complete);
        self.on_bytes_received = Some(on_bytes_received);
        self.on_io_error = Some(on_io_error);

        self.state = TlsIoState::Opening;
        self.retries_remaining = MAX_TLS_OPENING_RETRY;
        debug!(host = %self.hostname, port = self.port, "TLS open requested");

        self.dowork();
        Ok(())
    }

    fn close(&mut self, on_close_complete: Option<OnCloseComplete>) -> Result<()> {
        match self.state {
            TlsIoState::Closed | TlsIoState::Error => {
                info!(
                    state = self.state.as_str(),
                    "Close requested on a connection that is not open"
                );
                if self.state == TlsIoState::Error {
                    if let Err(e) = self.socket.close() {
                        debug!(error = %e, "Releasing failed TLS connection");
                    }
                }
                self.state = TlsIoState::Closed;
                Ok(())
            }
            TlsIoState::Opening | TlsIoState::Closing => {
                error!(
                    state = self.state.as_str(),
                    "Close requested while an open or close is still in progress"
                );
                let err = self.invalid_state("close");
                self.state = TlsIoState::Error;
                Err(err)
            }
            TlsIoState::Open => {
                self.on_close_complete = on_close_complete;
                self.retries_remaining = MAX_TLS_CLOSING_RETRY;
                self.state = TlsIoState::Closing;
                debug!(host = %self.hostname, port = self.port, "TLS close requested");

                self.dowork();
                Ok(())
            }
        }
    }

    fn send(&mut self, buffer: &[u8], on_send_complete: Option<OnSendComplete>) -> Result<()> {
        if buffer.is_empty() {
            error!("Invalid parameter: empty send buffer");
            return Err(XioError::InvalidArgument("send buffer is empty".to_string()));
        }
        if self.state != TlsIoState::Open {
            error!(state = self.state.as_str(), "TLS is not ready to send data");
            return Err(self.invalid_state("send"));
        }

        let mut sent = 0;
        while sent < buffer.len() {
            let failure = match self.socket.write(&buffer[sent..], self.write_timeout) {
                Ok(0) => TlsError::OperationFailed("write transmitted no bytes".to_string()),
                Ok(written) => {
                    sent += written.min(buffer.len() - sent);
                    continue;
                }
                Err(e) => e,
            };

            error!(sent, total = buffer.len(), error = %failure, "TLS failed sending data");
            if let Some(callback) = on_send_complete {
                callback(SendResult::Error);
            }
            return Err(XioError::Transport(failure));
        }

        trace!(sent, "TLS send complete");
        if let Some(callback) = on_send_complete {
            callback(SendResult::Ok);
        }
        Ok(())
    }

    fn dowork(&mut self) {
        match self.state {
            TlsIoState::Opening => self.step_opening(),
            TlsIoState::Open => self.drain_reads(),
            TlsIoState::Closing => self.step_closing(),
            TlsIoState::Closed | TlsIoState::Error => {}
        }
    }

    fn set_option(&mut self, name: &str, value: &str) -> Result<()> {
        if name == OPTION_TRUSTED_CERT {
            let pem = copy_str(value, "trusted certificate").map_err(|e| {
                error!("Unable to copy trusted certificate");
                e
            })?;
            if self.state == TlsIoState::Open {
                debug!("Trusted certificate replaced; applies to the next connection");
            }
            self.trusted_certificate = Some(pem);
            return Ok(());
        }

        self.options.set(name, value).map_err(|e| {
            warn!(option = name, error = %e, "Failed to set TLS option");
            e
        })
    }

    fn retrieve_options(&self) -> Result<OptionHandler> {
        let mut handler = OptionHandler::new();
        if let Some(ref pem) = self.trusted_certificate {
            handler.add(OPTION_TRUSTED_CERT, pem)?;
        }
        self.options.retrieve_into(&mut handler)?;
        Ok(handler)
    }
}

impl<S: SslSocket> Drop for TlsIo<S> {
    fn drop(&mut self) {
        if self.state != TlsIoState::Closed {
            error!(
                host = %self.hostname,
                state = self.state.as_str(),
                "TLS destroyed with a connection still active"
            );
        }
    }
}
