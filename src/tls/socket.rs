//! TLS socket operations
//!
//! This module defines the `SslSocket` primitive the adapter drives and
//! implements it over OpenSSL.

use super::cert;
use super::config::{SslConfig, TlsError, VerifyMode};
use openssl::ssl::{ErrorCode, HandshakeError, MidHandshakeSslStream, SslStream};
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::os::fd::AsRawFd;
use std::time::Duration;
use tracing::{debug, info, trace};

/// Synchronous TLS primitive
///
/// Every call returns within a bounded time. A failed `connect` or `close`
/// may be retried by calling it again.
pub trait SslSocket {
    /// Connect and run (or continue) the TLS handshake
    ///
    /// Returns `Ok(())` once the session is established; calling it again on
    /// an established session is a no-op.
    fn connect(&mut self, config: &SslConfig, host: &str, port: u16) -> Result<(), TlsError>;

    /// Read decrypted bytes, waiting at most `timeout` for some to arrive
    ///
    /// `Ok(0)` means no data is available right now.
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, TlsError>;

    /// Write bytes, returning how many were accepted
    fn write(&mut self, buf: &[u8], timeout: Duration) -> Result<usize, TlsError>;

    /// Shut the session down and release the connection
    ///
    /// The session is released even when an error is returned, so the next
    /// `connect` always starts a fresh handshake with the config it is given.
    fn close(&mut self) -> Result<(), TlsError>;
}

enum Connection {
    Idle,
    Handshaking(MidHandshakeSslStream<TcpStream>),
    Established(SslStream<TcpStream>),
}

/// OpenSSL implementation of `SslSocket`
///
/// A handshake step that does not complete within the configured handshake
/// timeout is parked and resumed by the next `connect` call.
pub struct OpenSslSocket {
    conn: Connection,
}

impl Default for OpenSslSocket {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenSslSocket {
    /// Create an unconnected socket
    pub fn new() -> Self {
        OpenSslSocket {
            conn: Connection::Idle,
        }
    }

    /// Check if the TLS session is established
    pub fn is_connected(&self) -> bool {
        matches!(self.conn, Connection::Established(_))
    }

    /// Negotiated protocol version, once connected
    pub fn version(&self) -> Option<&'static str> {
        match self.conn {
            Connection::Established(ref stream) => Some(stream.ssl().version_str()),
            _ => None,
        }
    }

    fn tcp_connect(host: &str, port: u16, timeout: Duration) -> Result<TcpStream, TlsError> {
        let mut last_err = None;

        for addr in (host, port).to_socket_addrs()? {
            let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
            match socket.connect_timeout(&addr.into(), timeout) {
                Ok(()) => {
                    socket.set_nodelay(true)?;
                    socket.set_read_timeout(Some(timeout))?;
                    socket.set_write_timeout(Some(timeout))?;
                    trace!(%addr, "TCP connected");
                    return Ok(socket.into());
                }
                Err(e) => {
                    debug!(%addr, error = %e, "TCP connect failed");
                    last_err = Some(e);
                }
            }
        }

        Err(match last_err {
            Some(e) => TlsError::Io(e),
            None => TlsError::InvalidConfig(format!("{} did not resolve to any address", host)),
        })
    }

    fn finish_handshake(
        &mut self,
        result: Result<SslStream<TcpStream>, HandshakeError<TcpStream>>,
    ) -> Result<(), TlsError> {
        match result {
            Ok(stream) => {
                let peer = cert::peer_chain(stream.ssl());
                info!(
                    version = stream.ssl().version_str(),
                    cipher = stream.ssl().current_cipher().map(|c| c.name()).unwrap_or("<none>"),
                    peer = ?peer.first().map(|c| c.subject.as_str()),
                    "TLS session established"
                );
                self.conn = Connection::Established(stream);
                Ok(())
            }
            Err(HandshakeError::WouldBlock(mid)) => {
                self.conn = Connection::Handshaking(mid);
                Err(TlsError::HandshakeInProgress)
            }
            Err(HandshakeError::SetupFailure(e)) => Err(TlsError::OpenSsl(e)),
            Err(HandshakeError::Failure(mid)) => {
                let verify = mid.ssl().verify_result();
                Err(TlsError::HandshakeFailed(format!(
                    "{} (verify: {})",
                    mid.error(),
                    verify.error_string()
                )))
            }
        }
    }

    fn established(&mut self) -> Result<&mut SslStream<TcpStream>, TlsError> {
        match self.conn {
            Connection::Established(ref mut stream) => Ok(stream),
            _ => Err(TlsError::NotConnected),
        }
    }
}

impl SslSocket for OpenSslSocket {
    fn connect(&mut self, config: &SslConfig, host: &str, port: u16) -> Result<(), TlsError> {
        match std::mem::replace(&mut self.conn, Connection::Idle) {
            Connection::Established(stream) => {
                self.conn = Connection::Established(stream);
                Ok(())
            }
            Connection::Handshaking(mid) => {
                trace!(host, port, "Resuming TLS handshake");
                self.finish_handshake(mid.handshake())
            }
            Connection::Idle => {
                debug!(
                    host,
                    port,
                    min = config.min_version.as_str(),
                    max = config.max_version.as_str(),
                    entropy = config.entropy_label,
                    "Starting TLS connect"
                );
                let connector = config.connector()?;
                let tcp = Self::tcp_connect(host, port, config.handshake_timeout)?;

                let mut ssl = connector.configure()?;
                ssl.set_verify_hostname(config.verify_mode != VerifyMode::None);
                self.finish_handshake(ssl.connect(host, tcp))
            }
        }
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, TlsError> {
        let stream = self.established()?;

        if stream.ssl().pending() == 0 && !poll_readable(stream.get_ref(), timeout)? {
            return Ok(0);
        }

        // Don't let a partial record block past the poll
        stream.get_ref().set_nonblocking(true)?;
        let result = stream.ssl_read(buf);
        stream.get_ref().set_nonblocking(false)?;

        match result {
            Ok(n) => Ok(n),
            Err(e) if e.code() == ErrorCode::WANT_READ || e.code() == ErrorCode::WANT_WRITE => {
                Ok(0)
            }
            Err(e) if e.code() == ErrorCode::ZERO_RETURN => Err(TlsError::OperationFailed(
                "peer closed the TLS session".to_string(),
            )),
            Err(e) => Err(TlsError::Ssl(e)),
        }
    }

    fn write(&mut self, buf: &[u8], timeout: Duration) -> Result<usize, TlsError> {
        let stream = self.established()?;
        stream
            .get_ref()
            .set_write_timeout(Some(timeout.max(Duration::from_millis(1))))?;

        match stream.ssl_write(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.code() == ErrorCode::WANT_WRITE || e.code() == ErrorCode::WANT_READ => {
                Ok(0)
            }
            Err(e) => Err(TlsError::Ssl(e)),
        }
    }

    fn close(&mut self) -> Result<(), TlsError> {
        match std::mem::replace(&mut self.conn, Connection::Idle) {
            Connection::Idle => Ok(()),
            Connection::Handshaking(mid) => {
                let _ = mid.get_ref().shutdown(Shutdown::Both);
                Ok(())
            }
            Connection::Established(mut stream) => {
                if let Err(e) = stream.shutdown() {
                    debug!(error = %e, "TLS close_notify not delivered");
                }

                // The session is dropped even when the TCP shutdown fails
                let result = stream.get_ref().shutdown(Shutdown::Both);
                drop(stream);
                match result {
                    Ok(()) => Ok(()),
                    Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
                    Err(e) => Err(TlsError::Io(e)),
                }
            }
        }
    }
}

/// Wait up to `timeout` for the socket to become readable
fn poll_readable(stream: &TcpStream, timeout: Duration) -> Result<bool, TlsError> {
    use libc::{poll, pollfd, POLLIN};

    let mut pfd = pollfd {
        fd: stream.as_raw_fd(),
        events: POLLIN,
        revents: 0,
    };

    let timeout_ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);

    let result = unsafe { poll(&mut pfd as *mut pollfd, 1, timeout_ms) };

    if result < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(false);
        }
        return Err(TlsError::Io(err));
    }

    Ok(result > 0)
}
