//! Named transport options
//!
//! A transport declares which options it understands when it builds its
//! `TlsIoOptions` store. Setting an option outside that set fails with
//! `NotSupported`; setting a supported one records an owned copy of the
//! value so it can be applied on the next connect and retrieved later.

use super::{copy_str, IoInterface, Result, XioError};

/// Trusted CA certificate chain (PEM)
pub const OPTION_TRUSTED_CERT: &str = "TrustedCerts";
/// Client certificate (PEM, RSA style)
pub const OPTION_X509_CERT: &str = "x509certificate";
/// Client private key (PEM, RSA style)
pub const OPTION_X509_KEY: &str = "x509privatekey";
/// Client certificate (PEM, ECC style)
pub const OPTION_X509_ECC_CERT: &str = "x509EccCertificate";
/// Client private key (PEM, ECC style)
pub const OPTION_X509_ECC_KEY: &str = "x509EccAliasKey";

/// Every option name known to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    TrustedCerts,
    X509Cert,
    X509Key,
    X509EccCert,
    X509EccKey,
}

impl OptionKind {
    /// Look up an option by its wire name (case-sensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            OPTION_TRUSTED_CERT => Some(OptionKind::TrustedCerts),
            OPTION_X509_CERT => Some(OptionKind::X509Cert),
            OPTION_X509_KEY => Some(OptionKind::X509Key),
            OPTION_X509_ECC_CERT => Some(OptionKind::X509EccCert),
            OPTION_X509_ECC_KEY => Some(OptionKind::X509EccKey),
            _ => None,
        }
    }

    /// Get the wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            OptionKind::TrustedCerts => OPTION_TRUSTED_CERT,
            OptionKind::X509Cert => OPTION_X509_CERT,
            OptionKind::X509Key => OPTION_X509_KEY,
            OptionKind::X509EccCert => OPTION_X509_ECC_CERT,
            OptionKind::X509EccKey => OPTION_X509_ECC_KEY,
        }
    }

    fn x509_family(&self) -> Option<X509Family> {
        match self {
            OptionKind::TrustedCerts => None,
            OptionKind::X509Cert | OptionKind::X509Key => Some(X509Family::Rsa),
            OptionKind::X509EccCert | OptionKind::X509EccKey => Some(X509Family::Ecc),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum X509Family {
    Rsa,
    Ecc,
}

/// Option store with a declared set of supported options
#[derive(Debug, Clone)]
pub struct TlsIoOptions {
    supported: &'static [OptionKind],
    trusted_certs: Option<String>,
    x509_cert: Option<String>,
    x509_key: Option<String>,
    x509_family: Option<X509Family>,
}

impl TlsIoOptions {
    /// Create an empty store accepting only `supported`
    pub fn new(supported: &'static [OptionKind]) -> Self {
        TlsIoOptions {
            supported,
            trusted_certs: None,
            x509_cert: None,
            x509_key: None,
            x509_family: None,
        }
    }

    /// Check whether an option was declared supported
    pub fn supports(&self, kind: OptionKind) -> bool {
        self.supported.contains(&kind)
    }

    /// Record an option value
    pub fn set(&mut self, name: &str, value: &str) -> Result<()> {
        let kind = OptionKind::from_name(name)
            .filter(|kind| self.supports(*kind))
            .ok_or_else(|| XioError::NotSupported(name.to_string()))?;

        if let Some(family) = kind.x509_family() {
            if self.x509_family.is_some_and(|current| current != family) {
                return Err(XioError::InvalidArgument(format!(
                    "{} cannot be mixed with an x509 pair of another kind",
                    name
                )));
            }
        }

        match kind {
            OptionKind::TrustedCerts => {
                self.trusted_certs = Some(copy_str(value, "trusted certificates")?);
            }
            OptionKind::X509Cert | OptionKind::X509EccCert => {
                self.x509_cert = Some(copy_str(value, "x509 certificate")?);
            }
            OptionKind::X509Key | OptionKind::X509EccKey => {
                self.x509_key = Some(copy_str(value, "x509 private key")?);
            }
        }
        self.x509_family = self.x509_family.or(kind.x509_family());

        Ok(())
    }

    /// Trusted certificates recorded in this store
    pub fn trusted_certs(&self) -> Option<&str> {
        self.trusted_certs.as_deref()
    }

    /// Client certificate, if one was set
    pub fn x509_cert(&self) -> Option<&str> {
        self.x509_cert.as_deref()
    }

    /// Client private key, if one was set
    pub fn x509_key(&self) -> Option<&str> {
        self.x509_key.as_deref()
    }

    /// Append every recorded option to `handler`
    pub fn retrieve_into(&self, handler: &mut OptionHandler) -> Result<()> {
        let (cert_name, key_name) = match self.x509_family {
            Some(X509Family::Ecc) => (OPTION_X509_ECC_CERT, OPTION_X509_ECC_KEY),
            _ => (OPTION_X509_CERT, OPTION_X509_KEY),
        };

        if let Some(ref certs) = self.trusted_certs {
            handler.add(OPTION_TRUSTED_CERT, certs)?;
        }
        if let Some(ref cert) = self.x509_cert {
            handler.add(cert_name, cert)?;
        }
        if let Some(ref key) = self.x509_key {
            handler.add(key_name, key)?;
        }
        Ok(())
    }
}

/// Owned snapshot of option values
///
/// Returned by `IoInterface::retrieve_options`; replaying it onto a fresh
/// transport reproduces the configuration of the original one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionHandler {
    entries: Vec<(String, String)>,
}

impl OptionHandler {
    /// Create an empty handler
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an owned copy of a name/value pair
    pub fn add(&mut self, name: &str, value: &str) -> Result<()> {
        let name = copy_str(name, "option name")?;
        let value = copy_str(value, "option value")?;
        self.entries.push((name, value));
        Ok(())
    }

    /// Look up a value by name
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Iterate over name/value pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Apply every option to `target`, stopping at the first failure
    pub fn feed_options<T: IoInterface + ?Sized>(&self, target: &mut T) -> Result<()> {
        for (name, value) in self.iter() {
            target.set_option(name, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSA_PAIR: &[OptionKind] = &[OptionKind::X509Cert, OptionKind::X509Key];
    const ALL: &[OptionKind] = &[
        OptionKind::TrustedCerts,
        OptionKind::X509Cert,
        OptionKind::X509Key,
        OptionKind::X509EccCert,
        OptionKind::X509EccKey,
    ];

    #[test]
    fn test_option_names() {
        assert_eq!(OptionKind::from_name("TrustedCerts"), Some(OptionKind::TrustedCerts));
        assert_eq!(OptionKind::from_name("x509EccAliasKey"), Some(OptionKind::X509EccKey));
        assert_eq!(OptionKind::from_name("trustedcerts"), None);
        assert_eq!(OptionKind::X509Cert.as_str(), "x509certificate");
    }

    #[test]
    fn test_unsupported_options_rejected() {
        let mut options = TlsIoOptions::new(RSA_PAIR);

        let result = options.set(OPTION_X509_ECC_CERT, "cert");
        assert!(matches!(result, Err(XioError::NotSupported(_))));

        let result = options.set("keepalive", "1");
        assert!(matches!(result, Err(XioError::NotSupported(ref name)) if name == "keepalive"));

        assert!(options.x509_cert().is_none());
    }

    #[test]
    fn test_supported_options_recorded() {
        let mut options = TlsIoOptions::new(RSA_PAIR);
        options.set(OPTION_X509_CERT, "cert-a").unwrap();
        options.set(OPTION_X509_KEY, "key-a").unwrap();
        options.set(OPTION_X509_CERT, "cert-b").unwrap();

        assert_eq!(options.x509_cert(), Some("cert-b"));
        assert_eq!(options.x509_key(), Some("key-a"));
    }

    #[test]
    fn test_mixed_x509_kinds_rejected() {
        let mut options = TlsIoOptions::new(ALL);
        options.set(OPTION_X509_ECC_CERT, "ecc-cert").unwrap();

        let result = options.set(OPTION_X509_KEY, "rsa-key");
        assert!(matches!(result, Err(XioError::InvalidArgument(_))));
        assert!(options.x509_key().is_none());

        options.set(OPTION_X509_ECC_KEY, "ecc-key").unwrap();
        assert_eq!(options.x509_key(), Some("ecc-key"));
    }

    #[test]
    fn test_retrieve_preserves_names() {
        let mut options = TlsIoOptions::new(ALL);
        options.set(OPTION_TRUSTED_CERT, "ca").unwrap();
        options.set(OPTION_X509_ECC_CERT, "ecc-cert").unwrap();

        let mut handler = OptionHandler::new();
        options.retrieve_into(&mut handler).unwrap();

        assert_eq!(handler.len(), 2);
        assert_eq!(handler.get(OPTION_TRUSTED_CERT), Some("ca"));
        assert_eq!(handler.get(OPTION_X509_ECC_CERT), Some("ecc-cert"));
        assert_eq!(handler.get(OPTION_X509_CERT), None);
    }

    #[test]
    fn test_empty_store_retrieves_nothing() {
        let options = TlsIoOptions::new(RSA_PAIR);
        let mut handler = OptionHandler::new();
        options.retrieve_into(&mut handler).unwrap();
        assert!(handler.is_empty());
    }
}
