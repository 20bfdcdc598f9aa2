//! Mapping of raw entries to application identities.

use std::sync::Arc;

use serde::Serialize;

use super::configuration::DirectoryConfiguration;
use super::search::{Attributes, RawEntry};

/// Entry found by a successful authentication.
///
/// Field names are read from the configuration which produced the entry.
#[derive(Debug, Clone)]
pub struct DirectoryEntry {
    raw: RawEntry,
    config: Arc<DirectoryConfiguration>,
}

/// Serializable view of a [`DirectoryEntry`].
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub dn: String,
    pub user_id: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<Vec<String>>,
    pub email: Vec<String>,
}

impl DirectoryEntry {
    pub fn new(raw: RawEntry, config: Arc<DirectoryConfiguration>) -> Self {
        Self { raw, config }
    }

    pub fn dn(&self) -> &str {
        &self.raw.dn
    }

    pub fn attributes(&self) -> &Attributes {
        &self.raw.attrs
    }

    pub fn configuration(&self) -> &DirectoryConfiguration {
        &self.config
    }

    /// Every value of the user id attribute.
    pub fn user_ids(&self) -> &[String] {
        self.values(&self.config.user_id_field)
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_ids().first().map(String::as_str)
    }

    /// `None` without configured username field or when the entry lacks it.
    pub fn usernames(&self) -> Option<&[String]> {
        let field = self.config.username_field.as_deref()?;
        self.raw.get(field)
    }

    pub fn username(&self) -> Option<&str> {
        self.usernames()?.first().map(String::as_str)
    }

    pub fn emails(&self) -> &[String] {
        self.values(&self.config.email_field)
    }

    pub fn email(&self) -> Option<&str> {
        self.emails().first().map(String::as_str)
    }

    pub fn identity(&self) -> Identity {
        Identity {
            dn: self.raw.dn.clone(),
            user_id: self.user_ids().to_vec(),
            username: self.usernames().map(<[String]>::to_vec),
            email: self.emails().to_vec(),
        }
    }

    pub fn into_raw(self) -> RawEntry {
        self.raw
    }

    fn values(&self, field: &str) -> &[String] {
        self.raw.get(field).unwrap_or_default()
    }
}
