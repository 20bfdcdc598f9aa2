//! Directory errors.

use ldap3::LdapError;
use validator::ValidationErrors;

pub type Result<T> = std::result::Result<T, DirectoryError>;

/// Errors raised while talking to, or configuring, a directory.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error(
        "invalid encryption value supplied: {0}, valid values: [simple_tls, start_tls] or unset"
    )]
    InvalidEncryptionMode(String),
    #[error("unsupported ssl version: {0}, valid values: [TLSv1, TLSv1_1, TLSv1_2]")]
    InvalidSslVersion(String),
    #[error("domain base `{0}` must be non-empty and contain no comma")]
    InvalidDomainBase(String),
    #[error("validation error occurred")]
    Validation(#[from] ValidationErrors),
    #[error("cannot read CA file")]
    CaFile(#[source] std::io::Error),
    #[error("cannot build TLS connector")]
    Tls(#[from] native_tls::Error),

    /// Wrong username or password, whatever the base.
    #[error("invalid credentials")]
    AuthenticationFailed,
    #[error("service credentials rejected by directory")]
    ServiceBindRejected,
    #[error("search under `{base}` rejected with code {code}: {message}")]
    SearchRejected {
        base: String,
        code: u32,
        message: String,
    },

    #[error("directory server unavailable")]
    Unavailable(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl DirectoryError {
    /// Wrap a transport fault.
    pub fn unavailable<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Unavailable(Box::new(err))
    }

    /// Whether the error comes from a defective configuration.
    /// Such errors are never worth a retry.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidEncryptionMode(_)
                | Self::InvalidSslVersion(_)
                | Self::InvalidDomainBase(_)
                | Self::Validation(_)
                | Self::CaFile(_)
                | Self::Tls(_)
        )
    }

    /// Whether the directory server could not be reached or misbehaved.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<LdapError> for DirectoryError {
    fn from(err: LdapError) -> Self {
        Self::unavailable(err)
    }
}
