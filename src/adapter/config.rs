//! Adapter configuration
//!
//! `TlsIoConfig` carries the create parameters of a `TlsIo`: the target
//! endpoint plus overrides of the default TLS policy.

use crate::tls::config::{DEFAULT_HANDSHAKE_TIMEOUT, SslConfig};
use crate::tls::{TlsVersion, VerifyMode};
use std::time::Duration;

/// Largest valid TCP port
pub const MAX_VALID_PORT: i32 = 0xffff;

/// Default per-call timeout for writes
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_millis(5000);

/// Create parameters for `TlsIo`
///
/// The port is kept as a signed integer, the way it usually arrives from
/// configuration sources; `TlsIo::create` rejects values outside
/// `0..=65535`.
#[derive(Debug, Clone)]
pub struct TlsIoConfig {
    pub(crate) hostname: String,
    pub(crate) port: i32,
    pub(crate) min_version: TlsVersion,
    pub(crate) max_version: TlsVersion,
    pub(crate) verify_mode: VerifyMode,
    pub(crate) io_timeout: Duration,
    pub(crate) read_timeout: Duration,
    pub(crate) trusted_certs: Option<String>,
    pub(crate) client_key_passwd: Option<String>,
}

impl TlsIoConfig {
    /// Target `hostname:port` with the default TLS policy
    pub fn new(hostname: impl Into<String>, port: i32) -> Self {
        let defaults = SslConfig::default();
        TlsIoConfig {
            hostname: hostname.into(),
            port,
            min_version: defaults.min_version,
            max_version: defaults.max_version,
            verify_mode: defaults.verify_mode,
            io_timeout: DEFAULT_IO_TIMEOUT,
            read_timeout: Duration::ZERO,
            trusted_certs: None,
            client_key_passwd: None,
        }
    }

    /// Set TLS version (both min and max)
    pub fn version(self, version: TlsVersion) -> Self {
        self.version_range(version, version)
    }

    /// Set TLS version range
    pub fn version_range(mut self, min: TlsVersion, max: TlsVersion) -> Self {
        self.min_version = min;
        self.max_version = max;
        self
    }

    /// Set server certificate verification mode
    pub fn verify_mode(mut self, mode: VerifyMode) -> Self {
        self.verify_mode = mode;
        self
    }

    /// Bound on each write and each connect/handshake step
    pub fn io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// How long each read in `dowork` waits for data
    ///
    /// Zero (the default) only collects bytes that are already available.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Pre-set the `TrustedCerts` option (PEM)
    pub fn trusted_certs(mut self, pem: impl Into<String>) -> Self {
        self.trusted_certs = Some(pem.into());
        self
    }

    /// Passphrase for an encrypted `x509privatekey` option value
    pub fn client_key_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.client_key_passwd = Some(passphrase.into());
        self
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn port(&self) -> i32 {
        self.port
    }

    pub(crate) fn ssl_config(&self) -> SslConfig {
        SslConfig {
            min_version: self.min_version,
            max_version: self.max_version,
            verify_mode: self.verify_mode,
            handshake_timeout: if self.io_timeout.is_zero() {
                DEFAULT_HANDSHAKE_TIMEOUT
            } else {
                self.io_timeout
            },
            client_key_passwd: self.client_key_passwd.clone(),
            ..SslConfig::default()
        }
    }
}
