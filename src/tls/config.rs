//! TLS configuration
//!
//! This module provides the `SslConfig` record handed to the socket
//! primitive on every connect attempt.

use super::cert;
use openssl::ssl::{SslConnector, SslMethod, SslVerifyMode};
use std::time::Duration;
use tracing::warn;

/// Entropy label used when none is configured
pub const DEFAULT_ENTROPY_LABEL: &str = "TLSIO_RS";

/// Default bound on a single TCP connect or handshake step
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// TLS version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    /// TLS 1.0
    Tls10,
    /// TLS 1.1
    Tls11,
    /// TLS 1.2
    Tls12,
    /// TLS 1.3
    Tls13,
}

impl TlsVersion {
    /// Get OpenSSL protocol version constant
    pub fn to_openssl_version(&self) -> openssl::ssl::SslVersion {
        use openssl::ssl::SslVersion;
        match self {
            TlsVersion::Tls10 => SslVersion::TLS1,
            TlsVersion::Tls11 => SslVersion::TLS1_1,
            TlsVersion::Tls12 => SslVersion::TLS1_2,
            TlsVersion::Tls13 => SslVersion::TLS1_3,
        }
    }

    /// Get version as string
    pub fn as_str(&self) -> &'static str {
        match self {
            TlsVersion::Tls10 => "TLSv1.0",
            TlsVersion::Tls11 => "TLSv1.1",
            TlsVersion::Tls12 => "TLSv1.2",
            TlsVersion::Tls13 => "TLSv1.3",
        }
    }
}

/// Server certificate verification mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyMode {
    /// Don't verify the server certificate
    None,
    /// Verify, but log and continue when verification fails
    Optional,
    /// Abort the handshake when verification fails
    Required,
}

/// TLS errors
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("OpenSSL error: {0}")]
    OpenSsl(#[from] openssl::error::ErrorStack),

    #[error("SSL error: {0}")]
    Ssl(#[from] openssl::ssl::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Certificate error: {0}")]
    Certificate(String),

    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("Handshake still in progress")]
    HandshakeInProgress,

    #[error("Not connected")]
    NotConnected,

    #[error("TLS operation failed: {0}")]
    OperationFailed(String),
}

/// Connection parameters consumed by the socket primitive
///
/// The adapter owns one of these for its whole lifetime and refreshes the
/// certificate fields from its options before every connect attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SslConfig {
    /// Trusted CA chain (PEM); `None` uses the system trust store
    pub ca_cert: Option<String>,
    /// Client certificate chain (PEM)
    pub client_cert: Option<String>,
    /// Client private key (PEM)
    pub client_key: Option<String>,
    /// Passphrase for an encrypted client key
    pub client_key_passwd: Option<String>,
    pub min_version: TlsVersion,
    pub max_version: TlsVersion,
    pub verify_mode: VerifyMode,
    /// Personalization label for the RNG
    pub entropy_label: &'static str,
    /// Bound on TCP connect and on each handshake step
    pub handshake_timeout: Duration,
}

impl Default for SslConfig {
    fn default() -> Self {
        SslConfig {
            ca_cert: None,
            client_cert: None,
            client_key: None,
            client_key_passwd: None,
            min_version: TlsVersion::Tls12,
            max_version: TlsVersion::Tls12,
            verify_mode: VerifyMode::Required,
            entropy_label: DEFAULT_ENTROPY_LABEL,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }
}

impl SslConfig {
    /// Build an OpenSSL connector from this configuration
    pub fn connector(&self) -> Result<SslConnector, TlsError> {
        if self.min_version > self.max_version {
            return Err(TlsError::InvalidConfig(format!(
                "minimum version {} is above maximum version {}",
                self.min_version.as_str(),
                self.max_version.as_str()
            )));
        }

        let mut builder = SslConnector::builder(SslMethod::tls_client())?;
        builder.set_min_proto_version(Some(self.min_version.to_openssl_version()))?;
        builder.set_max_proto_version(Some(self.max_version.to_openssl_version()))?;

        match self.verify_mode {
            VerifyMode::None => builder.set_verify(SslVerifyMode::NONE),
            VerifyMode::Required => builder.set_verify(SslVerifyMode::PEER),
            VerifyMode::Optional => {
                builder.set_verify_callback(SslVerifyMode::PEER, |preverify_ok, ctx| {
                    if !preverify_ok {
                        warn!(
                            depth = ctx.error_depth(),
                            error = %ctx.error(),
                            "Certificate verification failed, continuing"
                        );
                    }
                    true
                });
            }
        }

        if let Some(ref ca_pem) = self.ca_cert {
            let store = builder.cert_store_mut();
            for ca in cert::parse_chain(ca_pem)? {
                store.add_cert(ca)?;
            }
        }

        match (&self.client_cert, &self.client_key) {
            (Some(cert_pem), Some(key_pem)) => {
                let mut chain = cert::parse_chain(cert_pem)?.into_iter();
                if let Some(leaf) = chain.next() {
                    builder.set_certificate(&leaf)?;
                }
                for extra in chain {
                    builder.add_extra_chain_cert(extra)?;
                }

                let key = cert::parse_private_key(key_pem, self.client_key_passwd.as_deref())?;
                builder.set_private_key(&key)?;
                builder.check_private_key().map_err(|e| {
                    TlsError::Certificate(format!("Client key does not match certificate: {}", e))
                })?;
            }
            (None, None) => {}
            _ => {
                return Err(TlsError::InvalidConfig(
                    "client certificate and private key must be set together".to_string(),
                ));
            }
        }

        Ok(builder.build())
    }
}
