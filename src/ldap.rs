//! LDAP support.
//!
//! A [`Directory`] wraps one [`DirectoryConfiguration`] and lazily keeps a
//! service connection, bound with the configured search user, for lookups.
//! Credentials of end users are always tested on their own connections.

mod authenticator;
pub mod configuration;
pub mod connector;
pub mod encryption;
pub mod entry;
pub mod error;
pub mod search;
#[cfg(test)]
pub(crate) mod testing;

use std::fmt;
use std::sync::Arc;

use tokio::sync::Mutex;
use validator::Validate;

pub use configuration::{DirectoryConfiguration, Secret};
pub use connector::{Connector, DirectoryConnection, LdapConnector, Session};
pub use encryption::{Encryption, EncryptionPolicy, SslVersion};
pub use entry::{DirectoryEntry, Identity};
pub use error::{DirectoryError, Result};
pub use search::{Filter, RawEntry};

/// Directory server described by a [`DirectoryConfiguration`].
pub struct Directory {
    config: Arc<DirectoryConfiguration>,
    policy: EncryptionPolicy,
    connector: Arc<dyn Connector>,
    service: Mutex<Option<Arc<DirectoryConnection>>>,
}

impl Directory {
    /// Create a new [`Directory`] talking LDAP.
    pub fn new(config: DirectoryConfiguration) -> Result<Self> {
        Self::with_connector(config, LdapConnector)
    }

    /// Create a new [`Directory`] over a custom [`Connector`].
    ///
    /// Encryption settings and required fields are checked here, so a
    /// defective configuration never opens a socket.
    pub fn with_connector(
        config: DirectoryConfiguration,
        connector: impl Connector + 'static,
    ) -> Result<Self> {
        let policy = EncryptionPolicy::resolve(&config)?;
        config.validate()?;

        Ok(Self {
            config: Arc::new(config),
            policy,
            connector: Arc::new(connector),
            service: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &Arc<DirectoryConfiguration> {
        &self.config
    }

    pub fn policy(&self) -> &EncryptionPolicy {
        &self.policy
    }

    /// Open an unbound connection with the service credential.
    pub async fn connect(&self) -> Result<DirectoryConnection> {
        self.open(
            &self.config.connection_user,
            self.config.connection_password.expose(),
            "service",
        )
        .await
    }

    /// Open an unbound connection for another credential.
    pub async fn connect_as(&self, dn: &str, secret: &str) -> Result<DirectoryConnection> {
        self.open(dn, secret, "probe").await
    }

    async fn open(
        &self,
        dn: &str,
        secret: &str,
        purpose: &'static str,
    ) -> Result<DirectoryConnection> {
        metrics::counter!("ldap_connections_total", "purpose" => purpose).increment(1);
        tracing::debug!(
            host = %self.config.host,
            port = self.config.port,
            encryption = ?self.policy.encryption,
            purpose,
            "opening directory connection"
        );

        let session = self
            .connector
            .open(&self.config.host, self.config.port, &self.policy)
            .await?;
        Ok(DirectoryConnection::new(session, dn, secret))
    }

    /// Cached connection bound with the service credential.
    ///
    /// Creation happens under the cache lock: concurrent callers wait for
    /// the first one and share its connection.
    pub(crate) async fn service_connection(&self) -> Result<Arc<DirectoryConnection>> {
        let mut slot = self.service.lock().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(Arc::clone(conn));
        }

        let conn = self.connect().await?;
        match conn.bind().await {
            Ok(true) => {},
            Ok(false) => {
                tracing::error!(dn = conn.dn(), "service credentials rejected");
                close(&conn).await;
                return Err(DirectoryError::ServiceBindRejected);
            },
            Err(err) => {
                close(&conn).await;
                return Err(err);
            },
        }

        let conn = Arc::new(conn);
        *slot = Some(Arc::clone(&conn));
        Ok(conn)
    }

    /// Drop the cached service connection.
    pub async fn invalidate(&self) {
        let previous = self.service.lock().await.take();
        if let Some(conn) = previous {
            close(&conn).await;
        }
    }

    /// Drop `conn` if it still is the cached one.
    pub(crate) async fn discard(&self, conn: &Arc<DirectoryConnection>) {
        let mut slot = self.service.lock().await;
        if slot.as_ref().is_some_and(|cached| Arc::ptr_eq(cached, conn)) {
            *slot = None;
            drop(slot);
            close(conn).await;
        }
    }

    /// Reconnect with the service credential.
    ///
    /// Returns whether the bind succeeded. Only transport faults are errors.
    pub async fn test_connection(&self) -> Result<bool> {
        let mut slot = self.service.lock().await;
        if let Some(previous) = slot.take() {
            close(&previous).await;
        }

        let conn = self.connect().await?;
        let accepted = match conn.bind().await {
            Ok(accepted) => accepted,
            Err(err) => {
                close(&conn).await;
                return Err(err);
            },
        };

        if accepted {
            *slot = Some(Arc::new(conn));
        } else {
            tracing::warn!(dn = conn.dn(), "service credentials rejected");
            close(&conn).await;
        }

        Ok(accepted)
    }

    /// Entries of `object_class`, defaulting to the configured user class.
    pub async fn users(&self, object_class: Option<&str>) -> Result<Vec<RawEntry>> {
        let class = object_class.unwrap_or(self.config.user_object_class.as_str());
        self.search_in_domain_bases(&Filter::eq("objectClass", class))
            .await
    }

    /// Entries of `object_class`, defaulting to the configured group class.
    pub async fn groups(&self, object_class: Option<&str>) -> Result<Vec<RawEntry>> {
        let class = object_class.unwrap_or(self.config.group_object_class.as_str());
        self.search_in_domain_bases(&Filter::eq("objectClass", class))
            .await
    }
}

async fn close(conn: &DirectoryConnection) {
    if let Err(err) = conn.close().await {
        tracing::debug!(dn = conn.dn(), error = %err, "cannot unbind service connection");
    }
}

impl fmt::Debug for Directory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Directory")
            .field("config", &self.config)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
