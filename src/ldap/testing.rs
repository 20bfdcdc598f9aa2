//! In-memory directory used by tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::connector::{Connector, Session};
use super::encryption::EncryptionPolicy;
use super::error::{DirectoryError, Result};
use super::search::{Attributes, RawEntry};

/// `noSuchObject` result code.
const NO_SUCH_OBJECT: u32 = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Open,
    Bind { dn: String, accepted: bool },
    Search { base: String, filter: String },
    Unbind,
}

#[derive(Default)]
struct State {
    accounts: HashMap<String, String>,
    bases: HashMap<String, Vec<RawEntry>>,
    events: Vec<Event>,
    unreachable: bool,
    bind_fault: bool,
}

/// Records every call, so tests can tell which connections were opened.
#[derive(Clone, Default)]
pub struct MemoryDirectory(Arc<Mutex<State>>);

impl MemoryDirectory {
    pub fn with_account(self, dn: &str, password: &str) -> Self {
        self.state().accounts.insert(dn.into(), password.into());
        self
    }

    /// Declare a base without entries.
    pub fn with_base(self, base: &str) -> Self {
        self.state().bases.entry(base.into()).or_default();
        self
    }

    pub fn with_entry(self, base: &str, entry: RawEntry) -> Self {
        self.state().bases.entry(base.into()).or_default().push(entry);
        self
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state().unreachable = unreachable;
    }

    /// Sessions open, then break on the first bind.
    pub fn set_bind_fault(&self, fault: bool) {
        self.state().bind_fault = fault;
    }

    pub fn events(&self) -> Vec<Event> {
        self.state().events.clone()
    }

    /// Number of opened sessions.
    pub fn opened(&self) -> usize {
        self.events().iter().filter(|e| **e == Event::Open).count()
    }

    /// Bases searched, in order.
    pub fn searched(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Search { base, .. } => Some(base),
                _ => None,
            })
            .collect()
    }

    /// DNs a bind was attempted with, in order.
    pub fn binds(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Bind { dn, .. } => Some(dn),
                _ => None,
            })
            .collect()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.0.lock().unwrap()
    }

    fn check_reachable(&self) -> Result<()> {
        if self.state().unreachable {
            return Err(DirectoryError::unavailable(std::io::Error::from(
                std::io::ErrorKind::ConnectionRefused,
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Connector for MemoryDirectory {
    async fn open(
        &self,
        _host: &str,
        _port: u16,
        _policy: &EncryptionPolicy,
    ) -> Result<Box<dyn Session>> {
        // Give concurrent callers a chance to interleave.
        tokio::task::yield_now().await;
        self.check_reachable()?;
        self.state().events.push(Event::Open);
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl Session for MemoryDirectory {
    async fn simple_bind(&self, dn: &str, secret: &str) -> Result<bool> {
        tokio::task::yield_now().await;
        self.check_reachable()?;
        let mut state = self.state();
        if state.bind_fault {
            return Err(DirectoryError::unavailable(std::io::Error::from(
                std::io::ErrorKind::ConnectionReset,
            )));
        }
        let accepted = state.accounts.get(dn).is_some_and(|pwd| pwd == secret);
        state.events.push(Event::Bind {
            dn: dn.into(),
            accepted,
        });
        Ok(accepted)
    }

    async fn search(&self, base: &str, filter: &str) -> Result<Vec<RawEntry>> {
        self.check_reachable()?;
        let mut state = self.state();
        state.events.push(Event::Search {
            base: base.into(),
            filter: filter.into(),
        });

        let Some(entries) = state.bases.get(base) else {
            return Err(DirectoryError::SearchRejected {
                base: base.into(),
                code: NO_SUCH_OBJECT,
                message: "no such object".into(),
            });
        };

        Ok(entries
            .iter()
            .filter(|entry| matches(entry, filter))
            .cloned()
            .collect())
    }

    async fn unbind(&self) -> Result<()> {
        self.state().events.push(Event::Unbind);
        Ok(())
    }
}

/// Equality and presence filters only. Empty entries always match, like
/// the null results some servers send back.
fn matches(entry: &RawEntry, filter: &str) -> bool {
    if entry.is_empty() {
        return true;
    }

    let Some((attribute, value)) = filter
        .trim_start_matches('(')
        .trim_end_matches(')')
        .split_once('=')
    else {
        return false;
    };

    match entry.get(attribute) {
        Some(_) if value == "*" => true,
        Some(values) => values.iter().any(|v| v.eq_ignore_ascii_case(value)),
        None => false,
    }
}

/// Build an entry from `(attribute, value)` pairs. Repeat an attribute for
/// several values.
pub fn entry(dn: &str, pairs: &[(&str, &str)]) -> RawEntry {
    let mut attrs = Attributes::new();
    for (attribute, value) in pairs {
        attrs
            .entry((*attribute).to_owned())
            .or_default()
            .push((*value).to_owned());
    }
    RawEntry::new(dn, attrs)
}
