//! Directory connections.
//!
//! [`Connector`] opens a transport [`Session`]; [`DirectoryConnection`] ties a
//! session to the credential it binds with.

use std::fmt;

use async_trait::async_trait;
use ldap3::{Ldap as Ldap3, LdapConnAsync, Scope, SearchEntry};

use super::encryption::EncryptionPolicy;
use super::error::{DirectoryError, Result};
use super::search::RawEntry;

/// LDAP `success` result code.
const SUCCESS: u32 = 0;
/// Request every user attribute.
const ALL_USER_ATTRIBUTES: &str = "*";

/// Opens sessions to a directory server.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(
        &self,
        host: &str,
        port: u16,
        policy: &EncryptionPolicy,
    ) -> Result<Box<dyn Session>>;
}

/// An open transport to a directory server.
#[async_trait]
pub trait Session: Send + Sync {
    /// `Ok(false)` when the server refuses the credential.
    async fn simple_bind(&self, dn: &str, secret: &str) -> Result<bool>;

    /// Subtree search under `base`.
    async fn search(&self, base: &str, filter: &str) -> Result<Vec<RawEntry>>;

    async fn unbind(&self) -> Result<()>;
}

/// [`Connector`] backed by `ldap3`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LdapConnector;

#[async_trait]
impl Connector for LdapConnector {
    async fn open(
        &self,
        host: &str,
        port: u16,
        policy: &EncryptionPolicy,
    ) -> Result<Box<dyn Session>> {
        let settings = policy.settings();
        let url = policy.url(host, port);

        let (handle, mut conn) = LdapConnAsync::with_settings(settings, &url).await?;
        ldap3::drive!(handle);
        conn.with_timeout(policy.timeout);

        Ok(Box::new(LdapSession { conn }))
    }
}

struct LdapSession {
    conn: Ldap3,
}

#[async_trait]
impl Session for LdapSession {
    async fn simple_bind(&self, dn: &str, secret: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let result = conn.simple_bind(dn, secret).await?;

        if result.rc != SUCCESS {
            tracing::debug!(dn, code = result.rc, "bind refused");
        }
        Ok(result.rc == SUCCESS)
    }

    async fn search(&self, base: &str, filter: &str) -> Result<Vec<RawEntry>> {
        let mut conn = self.conn.clone();
        let result = conn
            .search(base, Scope::Subtree, filter, vec![ALL_USER_ATTRIBUTES])
            .await?;

        if result.1.rc != SUCCESS {
            return Err(DirectoryError::SearchRejected {
                base: base.to_owned(),
                code: result.1.rc,
                message: result.1.text,
            });
        }

        Ok(result
            .0
            .into_iter()
            .map(|entry| {
                let entry = SearchEntry::construct(entry);
                RawEntry::new(entry.dn, entry.attrs)
            })
            .collect())
    }

    async fn unbind(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.unbind().await?;
        Ok(())
    }
}

/// A session and the credential it authenticates with.
///
/// Creating one does not bind; call [`DirectoryConnection::bind`].
pub struct DirectoryConnection {
    session: Box<dyn Session>,
    dn: String,
    secret: String,
}

impl DirectoryConnection {
    pub(crate) fn new(
        session: Box<dyn Session>,
        dn: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            session,
            dn: dn.into(),
            secret: secret.into(),
        }
    }

    pub fn dn(&self) -> &str {
        &self.dn
    }

    /// Authenticate the session. Refused credentials yield `Ok(false)`,
    /// transport faults an error.
    pub async fn bind(&self) -> Result<bool> {
        self.session.simple_bind(&self.dn, &self.secret).await
    }

    /// Bind then close, whatever the outcome.
    pub async fn probe(self) -> Result<bool> {
        let accepted = self.bind().await;

        if let Err(err) = self.session.unbind().await {
            tracing::debug!(dn = %self.dn, error = %err, "unbind failed after probe");
        }
        accepted
    }

    pub async fn search(&self, base: &str, filter: &str) -> Result<Vec<RawEntry>> {
        self.session.search(base, filter).await
    }

    pub async fn close(&self) -> Result<()> {
        self.session.unbind().await
    }
}

impl fmt::Debug for DirectoryConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryConnection")
            .field("dn", &self.dn)
            .finish_non_exhaustive()
    }
}
