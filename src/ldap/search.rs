//! Searches over the configured domain bases.

use std::collections::HashMap;
use std::fmt;

use super::Directory;
use super::error::Result;

/// Attribute name to values, as returned by the server.
pub type Attributes = HashMap<String, Vec<String>>;

/// A search result before any interpretation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RawEntry {
    pub dn: String,
    pub attrs: Attributes,
}

impl RawEntry {
    pub fn new(dn: impl Into<String>, attrs: Attributes) -> Self {
        Self {
            dn: dn.into(),
            attrs,
        }
    }

    /// Values of `attribute`. Attribute names are case-insensitive.
    pub fn get(&self, attribute: &str) -> Option<&[String]> {
        self.attrs
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(attribute))
            .map(|(_, values)| values.as_slice())
    }

    pub fn is_empty(&self) -> bool {
        self.dn.is_empty() && self.attrs.values().all(Vec::is_empty)
    }
}

/// RFC 4515 search filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter(String);

impl Filter {
    /// `(attribute=value)`, `value` being escaped.
    pub fn eq(attribute: &str, value: &str) -> Self {
        Self(format!("({attribute}={})", escape_filter_value(value)))
    }

    /// `(attribute=*)`.
    pub fn present(attribute: &str) -> Self {
        Self(format!("({attribute}=*)"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Filter {
    fn default() -> Self {
        Self::present("objectClass")
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn escape_filter_value(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '*' => out.push_str(r"\2a"),
            '(' => out.push_str(r"\28"),
            ')' => out.push_str(r"\29"),
            '\\' => out.push_str(r"\5c"),
            '\0' => out.push_str(r"\00"),
            c => out.push(c),
        }
    }
    out
}

impl Directory {
    /// Search under `base` with the service connection. No filter matches
    /// every entry.
    pub async fn search(&self, base: &str, filter: Option<&Filter>) -> Result<Vec<RawEntry>> {
        let filter = filter.cloned().unwrap_or_default();
        let conn = self.service_connection().await?;

        match conn.search(base, filter.as_str()).await {
            Err(err) if err.is_unavailable() => {
                tracing::warn!(base, %filter, error = %err, "search failed, dropping service connection");
                self.discard(&conn).await;
                Err(err)
            },
            result => result,
        }
    }

    /// Run `filter` under every domain base, in configured order.
    ///
    /// Bases are assumed disjoint: an entry reachable from two bases is
    /// returned twice.
    pub async fn search_in_domain_bases(&self, filter: &Filter) -> Result<Vec<RawEntry>> {
        let mut entries = Vec::new();
        for base in self.config().domain_bases_list() {
            let found = self.search(&base, Some(filter)).await?;
            entries.extend(found.into_iter().filter(|entry| !entry.is_empty()));
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ldap::configuration::tests::configuration;
    use crate::ldap::error::DirectoryError;
    use crate::ldap::testing::{Event, MemoryDirectory, entry};

    #[test]
    fn test_filter() {
        assert_eq!(Filter::eq("cn", "alice").as_str(), "(cn=alice)");
        assert_eq!(Filter::eq("cn", "*)(uid=*").as_str(), r"(cn=\2a\29\28uid=\2a)");
        assert_eq!(Filter::eq("cn", "zoë").as_str(), "(cn=zoë)");
        assert_eq!(Filter::default().to_string(), "(objectClass=*)");
    }

    #[test]
    fn test_attribute_case() {
        let entry = entry("cn=alice,ou=staff", &[("mail", "alice@example.com")]);
        assert_eq!(entry.get("MAIL"), Some(&["alice@example.com".to_owned()][..]));
        assert_eq!(entry.get("uid"), None);
        assert!(RawEntry::default().is_empty());
        assert!(!entry.is_empty());
    }

    #[tokio::test]
    async fn test_search_in_domain_bases() {
        let memory = MemoryDirectory::default()
            .with_account("cn=admin,dc=example", "admin")
            .with_entry("ou=staff", entry("cn=e1,ou=staff", &[("objectClass", "person")]))
            .with_entry("ou=staff", entry("cn=e2,ou=staff", &[("objectClass", "person")]))
            .with_entry("ou=staff", RawEntry::default())
            .with_base("ou=guests");
        let directory = Directory::with_connector(configuration(), memory.clone()).unwrap();

        let entries = directory
            .search_in_domain_bases(&Filter::eq("objectClass", "person"))
            .await
            .unwrap();

        let dns: Vec<_> = entries.iter().map(|e| e.dn.as_str()).collect();
        assert_eq!(dns, vec!["cn=e1,ou=staff", "cn=e2,ou=staff"]);

        // One service connection for both bases.
        assert_eq!(memory.opened(), 1);
    }

    #[tokio::test]
    async fn test_no_deduplication() {
        let shared = entry("cn=e1,dc=example", &[("objectClass", "person")]);
        let memory = MemoryDirectory::default()
            .with_account("cn=admin,dc=example", "admin")
            .with_entry("ou=staff", shared.clone())
            .with_entry("ou=guests", shared);
        let directory = Directory::with_connector(configuration(), memory).unwrap();

        let entries = directory
            .search_in_domain_bases(&Filter::default())
            .await
            .unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[tokio::test]
    async fn test_search_without_filter() {
        let memory = MemoryDirectory::default()
            .with_account("cn=admin,dc=example", "admin")
            .with_entry(
                "ou=staff",
                entry("cn=e1,ou=staff", &[("objectClass", "person"), ("cn", "e1")]),
            );
        let directory = Directory::with_connector(configuration(), memory.clone()).unwrap();

        let entries = directory.search("ou=staff", None).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert!(memory.events().contains(&Event::Search {
            base: "ou=staff".into(),
            filter: "(objectClass=*)".into(),
        }));
    }

    #[tokio::test]
    async fn test_unknown_base() {
        let memory = MemoryDirectory::default().with_account("cn=admin,dc=example", "admin");
        let directory = Directory::with_connector(configuration(), memory).unwrap();

        let err = directory.search("ou=nowhere", None).await.unwrap_err();
        assert!(matches!(err, DirectoryError::SearchRejected { code: 32, .. }));
    }

    #[tokio::test]
    async fn test_transport_fault_drops_service_connection() {
        let memory = MemoryDirectory::default()
            .with_account("cn=admin,dc=example", "admin")
            .with_base("ou=staff");
        let directory = Directory::with_connector(configuration(), memory.clone()).unwrap();

        directory.search("ou=staff", None).await.unwrap();
        memory.set_unreachable(true);
        assert!(directory.search("ou=staff", None).await.unwrap_err().is_unavailable());

        memory.set_unreachable(false);
        directory.search("ou=staff", None).await.unwrap();
        assert_eq!(memory.opened(), 2);
    }
}
