//! Transport security resolution.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ldap3::LdapConnSettings;
use native_tls::{Certificate, Protocol, TlsConnector};

use super::configuration::DirectoryConfiguration;
use super::error::{DirectoryError, Result};

/// How the transport is secured.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Encryption {
    /// Clear text, simple bind.
    #[default]
    None,
    /// TLS from the first byte (LDAPS).
    SimpleTls,
    /// Clear text connection upgraded with the StartTLS extended operation.
    StartTls,
}

impl FromStr for Encryption {
    type Err = DirectoryError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "" => Ok(Self::None),
            "simple_tls" => Ok(Self::SimpleTls),
            "start_tls" => Ok(Self::StartTls),
            other => Err(DirectoryError::InvalidEncryptionMode(other.to_owned())),
        }
    }
}

/// Protocol version pinned for the TLS negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SslVersion {
    TlsV1,
    TlsV1_1,
    TlsV1_2,
}

impl FromStr for SslVersion {
    type Err = DirectoryError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "TLSv1" => Ok(Self::TlsV1),
            "TLSv1_1" => Ok(Self::TlsV1_1),
            "TLSv1_2" => Ok(Self::TlsV1_2),
            other => Err(DirectoryError::InvalidSslVersion(other.to_owned())),
        }
    }
}

impl From<SslVersion> for Protocol {
    fn from(version: SslVersion) -> Self {
        match version {
            SslVersion::TlsV1 => Protocol::Tlsv10,
            SslVersion::TlsV1_1 => Protocol::Tlsv11,
            SslVersion::TlsV1_2 => Protocol::Tlsv12,
        }
    }
}

/// Concrete transport settings of a directory configuration.
///
/// The TLS connector, CA included, is built once when resolving.
#[derive(Clone)]
pub struct EncryptionPolicy {
    pub encryption: Encryption,
    /// Only kept for `StartTls`.
    pub ca_file: Option<PathBuf>,
    pub ssl_version: Option<SslVersion>,
    pub skip_verify: bool,
    pub timeout: Duration,
    connector: Option<TlsConnector>,
}

impl EncryptionPolicy {
    /// Resolve textual settings. Fails on unknown values or an unreadable
    /// CA file.
    pub fn resolve(config: &DirectoryConfiguration) -> Result<Self> {
        let encryption = config
            .encryption
            .as_deref()
            .map(Encryption::from_str)
            .transpose()?
            .unwrap_or_default();

        let ssl_version = config
            .ssl_version
            .as_deref()
            .filter(|version| !version.is_empty())
            .map(SslVersion::from_str)
            .transpose()?;

        let ca_file = match encryption {
            Encryption::StartTls => config.ca_file.clone(),
            _ => None,
        };

        let connector = match encryption {
            Encryption::None => None,
            Encryption::SimpleTls | Encryption::StartTls => Some(tls_connector(
                ca_file.as_deref(),
                ssl_version,
                config.insecure_skip_verify,
            )?),
        };

        Ok(Self {
            encryption,
            ca_file,
            ssl_version,
            skip_verify: config.insecure_skip_verify,
            timeout: config.timeout(),
            connector,
        })
    }

    /// Connection URL for `host:port`.
    pub fn url(&self, host: &str, port: u16) -> String {
        let scheme = match self.encryption {
            Encryption::SimpleTls => "ldaps",
            Encryption::None | Encryption::StartTls => "ldap",
        };
        format!("{scheme}://{host}:{port}")
    }

    /// `ldap3` settings for a new connection.
    pub fn settings(&self) -> LdapConnSettings {
        let settings = LdapConnSettings::new().set_conn_timeout(self.timeout);

        match &self.connector {
            None => settings,
            Some(connector) => settings
                .set_starttls(self.encryption == Encryption::StartTls)
                .set_no_tls_verify(self.skip_verify)
                .set_connector(connector.clone()),
        }
    }
}

impl fmt::Debug for EncryptionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionPolicy")
            .field("encryption", &self.encryption)
            .field("ca_file", &self.ca_file)
            .field("ssl_version", &self.ssl_version)
            .field("skip_verify", &self.skip_verify)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

fn tls_connector(
    ca_file: Option<&Path>,
    ssl_version: Option<SslVersion>,
    skip_verify: bool,
) -> Result<TlsConnector> {
    let mut builder = TlsConnector::builder();
    builder
        .danger_accept_invalid_certs(skip_verify)
        .danger_accept_invalid_hostnames(skip_verify);

    if let Some(version) = ssl_version {
        builder
            .min_protocol_version(Some(version.into()))
            .max_protocol_version(Some(version.into()));
    }

    if let Some(path) = ca_file {
        let pem = std::fs::read(path).map_err(DirectoryError::CaFile)?;
        builder.add_root_certificate(Certificate::from_pem(&pem)?);
    }

    Ok(builder.build()?)
}
