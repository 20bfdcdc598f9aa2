//! Directory configuration record.
//!
//! The record is owned by an external store. This crate only reads it, plus
//! the conversion between the stored comma-separated `domain_bases` and the
//! ordered list used for searches.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize, Serializer};
use validator::{Validate, ValidationError};

use super::error::{DirectoryError, Result};

/// Attribute used to build candidate DNs when none is configured.
pub const DEFAULT_BIND_ATTRIBUTE: &str = "cn";
/// Connection and operation timeout, in seconds.
pub const DEFAULT_TIMEOUT: u64 = 10;
const DOMAIN_BASES_SEPARATOR: char = ',';
const REDACTED: &str = "***";

/// Password which never shows up in logs.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Serializes as a placeholder, never as the secret itself.
impl Serialize for Secret {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(REDACTED)
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret({REDACTED})")
    }
}

/// Connection parameters of an external directory server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct DirectoryConfiguration {
    /// LDAP host or IP address.
    #[validate(length(min = 1))]
    pub host: String,
    /// e.g. 389, or 636 for LDAPS.
    #[validate(range(min = 1))]
    pub port: u16,
    /// `simple_tls`, `start_tls` or nothing for plain connections.
    #[serde(default)]
    pub encryption: Option<String>,
    /// Trust anchor for `start_tls`.
    #[serde(default)]
    pub ca_file: Option<PathBuf>,
    /// Pinned protocol version, e.g. `TLSv1_1`.
    #[serde(default)]
    pub ssl_version: Option<String>,
    /// Full DN of the search user, e.g. `cn=admin,dc=example`.
    #[validate(length(min = 1))]
    pub connection_user: String,
    #[serde(skip_serializing)]
    #[validate(custom(function = "validate_secret"))]
    pub connection_password: Secret,
    /// Entry attribute holding the stable user id, e.g. `uid`.
    #[validate(length(min = 1))]
    pub user_id_field: String,
    #[serde(default)]
    pub username_field: Option<String>,
    #[validate(length(min = 1))]
    pub email_field: String,
    /// Comma-separated search roots, tried in order.
    #[serde(default)]
    #[validate(custom(function = "validate_domain_bases"))]
    pub domain_bases: String,
    #[validate(length(min = 1))]
    pub user_object_class: String,
    #[validate(length(min = 1))]
    pub group_object_class: String,
    /// Attribute used to build `<attr>=<username>,<base>` when
    /// authenticating. Defaults to `cn`.
    #[serde(default)]
    pub bind_attribute: Option<String>,
    /// Disable certificate and host name verification under TLS.
    #[serde(default = "insecure_by_default")]
    pub insecure_skip_verify: bool,
    /// Timeout in seconds.
    #[serde(default)]
    pub timeout: Option<u64>,
}

fn insecure_by_default() -> bool {
    true
}

impl Default for DirectoryConfiguration {
    fn default() -> Self {
        Self {
            host: String::default(),
            port: 389,
            encryption: None,
            ca_file: None,
            ssl_version: None,
            connection_user: String::default(),
            connection_password: Secret::default(),
            user_id_field: String::default(),
            username_field: None,
            email_field: String::default(),
            domain_bases: String::default(),
            user_object_class: String::default(),
            group_object_class: String::default(),
            bind_attribute: None,
            insecure_skip_verify: insecure_by_default(),
            timeout: None,
        }
    }
}

impl DirectoryConfiguration {
    /// Ordered search roots.
    pub fn domain_bases_list(&self) -> Vec<String> {
        split_domain_bases(&self.domain_bases)
    }

    /// Replace search roots. Entries can not contain the separator.
    pub fn set_domain_bases_list<I, S>(&mut self, list: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let list = list
            .into_iter()
            .map(|base| {
                let base = base.as_ref();
                if base.trim().is_empty() || base.contains(DOMAIN_BASES_SEPARATOR) {
                    Err(DirectoryError::InvalidDomainBase(base.to_owned()))
                } else {
                    Ok(base.to_owned())
                }
            })
            .collect::<Result<Vec<_>>>()?;

        self.domain_bases = list.join(",");
        Ok(())
    }

    /// Attribute used for candidate DNs and the login filter.
    pub fn bind_attribute(&self) -> &str {
        self.bind_attribute
            .as_deref()
            .filter(|attr| !attr.is_empty())
            .unwrap_or(DEFAULT_BIND_ATTRIBUTE)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout.unwrap_or(DEFAULT_TIMEOUT))
    }
}

fn split_domain_bases(bases: &str) -> Vec<String> {
    bases
        .split(DOMAIN_BASES_SEPARATOR)
        .map(str::trim)
        .filter(|base| !base.is_empty())
        .map(str::to_owned)
        .collect()
}

fn validate_secret(secret: &Secret) -> std::result::Result<(), ValidationError> {
    if secret.is_empty() {
        return Err(ValidationError::new("length"));
    }
    Ok(())
}

fn validate_domain_bases(bases: &str) -> std::result::Result<(), ValidationError> {
    if split_domain_bases(bases).is_empty() {
        return Err(ValidationError::new("domain_bases")
            .with_message("at least one domain base is required".into()));
    }
    Ok(())
}
