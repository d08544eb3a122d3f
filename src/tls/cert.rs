//! Certificate handling
//!
//! PEM parsing for trusted chains and client identities, plus a short
//! summary of X.509 certificates for diagnostics.

use super::TlsError;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::x509::{X509NameRef, X509Ref, X509};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Certificate information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertInfo {
    /// Certificate subject (Common Name)
    pub subject: String,
    /// Certificate issuer (Common Name)
    pub issuer: String,
    /// Subject Alternative Names (DNS names and IP addresses)
    pub subject_alt_names: Vec<String>,
}

impl CertInfo {
    /// Extract certificate information from an X.509 certificate
    pub fn from_x509(cert: &X509Ref) -> Self {
        CertInfo {
            subject: common_name(cert.subject_name()),
            issuer: common_name(cert.issuer_name()),
            subject_alt_names: subject_alt_names(cert),
        }
    }
}

fn common_name(name: &X509NameRef) -> String {
    name.entries_by_nid(Nid::COMMONNAME)
        .next()
        .map(|entry| String::from_utf8_lossy(entry.data().as_slice()).into_owned())
        .unwrap_or_else(|| "<undef>".to_string())
}

fn subject_alt_names(cert: &X509Ref) -> Vec<String> {
    let mut names = Vec::new();

    if let Some(san_ext) = cert.subject_alt_names() {
        for name in san_ext {
            if let Some(dns) = name.dnsname() {
                names.push(format!("DNS:{}", dns));
            } else if let Some(ip) = name.ipaddress() {
                if let Ok(octets) = <[u8; 4]>::try_from(ip) {
                    names.push(format!("IP:{}", std::net::Ipv4Addr::from(octets)));
                } else if let Ok(octets) = <[u8; 16]>::try_from(ip) {
                    names.push(format!("IP:{}", std::net::Ipv6Addr::from(octets)));
                }
            }
        }
    }

    names
}

/// Parse every certificate in a PEM string
///
/// Fails when the string holds no certificate at all.
pub fn parse_chain(pem: &str) -> Result<Vec<X509>, TlsError> {
    let chain = X509::stack_from_pem(pem.as_bytes())
        .map_err(|e| TlsError::Certificate(format!("Failed to parse certificates: {}", e)))?;

    if chain.is_empty() {
        return Err(TlsError::Certificate(
            "No certificate found in PEM data".to_string(),
        ));
    }
    Ok(chain)
}

/// Parse a private key, optionally protected by a passphrase
pub fn parse_private_key(pem: &str, passphrase: Option<&str>) -> Result<PKey<Private>, TlsError> {
    let key = match passphrase {
        Some(pass) => PKey::private_key_from_pem_passphrase(pem.as_bytes(), pass.as_bytes()),
        None => PKey::private_key_from_pem(pem.as_bytes()),
    };
    key.map_err(|e| TlsError::Certificate(format!("Failed to load private key: {}", e)))
}

/// Summarize the peer chain of an established session
pub fn peer_chain(ssl: &openssl::ssl::SslRef) -> Vec<CertInfo> {
    ssl.peer_cert_chain()
        .map(|chain| chain.iter().map(CertInfo::from_x509).collect())
        .unwrap_or_default()
}

/// Read a PEM file into a string, e.g. to feed the `TrustedCerts` option
pub fn read_pem_file<P: AsRef<Path>>(path: P) -> Result<String, TlsError> {
    let mut pem = String::new();
    File::open(path.as_ref())?.read_to_string(&mut pem)?;

    if !pem.contains("-----BEGIN ") {
        return Err(TlsError::Certificate(format!(
            "{} does not contain PEM data",
            path.as_ref().display()
        )));
    }
    Ok(pem)
}
