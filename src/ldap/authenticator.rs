//! Credential verification against the domain bases.

use std::sync::Arc;

use super::Directory;
use super::entry::DirectoryEntry;
use super::error::{DirectoryError, Result};
use super::search::Filter;

impl Directory {
    /// Check `username` and `password` and return the matching entry.
    ///
    /// Each domain base is tried in order with a fresh connection bound as
    /// `<bind_attribute>=<username>,<base>`. The first base accepting the
    /// credential is searched with the service connection.
    ///
    /// Unknown users and wrong passwords both give
    /// [`DirectoryError::AuthenticationFailed`].
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<DirectoryEntry> {
        let result = self.verify(username, password).await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(err) if err.is_unavailable() => "unavailable",
            Err(_) => "failure",
        };
        metrics::counter!("ldap_authentications_total", "outcome" => outcome).increment(1);

        result
    }

    async fn verify(&self, username: &str, password: &str) -> Result<DirectoryEntry> {
        // An empty password is an anonymous bind, which servers accept.
        if username.is_empty() || password.is_empty() {
            return Err(DirectoryError::AuthenticationFailed);
        }

        let attribute = self.config().bind_attribute();
        let rdn = format!("{attribute}={}", ldap3::dn_escape(username));

        let Some(base) = self.matching_base(&rdn, password).await? else {
            tracing::info!(username, "credentials refused under every domain base");
            return Err(DirectoryError::AuthenticationFailed);
        };

        let filter = Filter::eq(attribute, username);
        let entries = match self.search(&base, Some(&filter)).await {
            Ok(entries) => entries,
            Err(DirectoryError::SearchRejected { code, message, .. }) => {
                tracing::warn!(%base, code, text = %message, "entry lookup rejected after bind");
                return Err(DirectoryError::AuthenticationFailed);
            },
            Err(err) => return Err(err),
        };

        // Further matches are ignored.
        match entries.into_iter().next() {
            Some(entry) if !entry.is_empty() => {
                tracing::debug!(username, %base, dn = %entry.dn, "user authenticated");
                Ok(DirectoryEntry::new(entry, Arc::clone(self.config())))
            },
            _ => {
                tracing::warn!(username, %base, "bind accepted but no entry found");
                Err(DirectoryError::AuthenticationFailed)
            },
        }
    }

    /// First base where the candidate DN binds with `password`.
    ///
    /// A refused bind moves on to the next base, a transport fault aborts.
    async fn matching_base(&self, rdn: &str, password: &str) -> Result<Option<String>> {
        for base in self.config().domain_bases_list() {
            let candidate = format!("{rdn},{base}");
            let conn = self.connect_as(&candidate, password).await?;

            if conn.probe().await? {
                return Ok(Some(base));
            }
        }
        Ok(None)
    }
}
