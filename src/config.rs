//! Configuration manager for dirauth.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::FromRef;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::ldap::DirectoryConfiguration;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const DEFAULT_ADDRESS: &str = "0.0.0.0:1111";
/// Seconds granted to a whole authentication.
const DEFAULT_TIMEOUT: u64 = 15;
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Instance name.
    #[serde(default)]
    pub name: String,
    /// Listening address, e.g. `0.0.0.0:1111`.
    #[serde(default = "default_address")]
    pub address: String,
    /// Seconds granted to a login request before giving up on the directory.
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    version: String,
    #[serde(skip)]
    path: PathBuf,
    /// Related to LDAP configuration.
    #[serde(skip_serializing)]
    pub ldap: Option<DirectoryConfiguration>,
}

fn default_address() -> String {
    DEFAULT_ADDRESS.to_owned()
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_owned(),
            address: default_address(),
            timeout: None,
            version: VERSION.to_owned(),
            path: PathBuf::default(),
            ldap: None,
        }
    }
}

impl FromRef<AppState> for Arc<Configuration> {
    fn from_ref(state: &AppState) -> Arc<Configuration> {
        Arc::clone(&state.config)
    }
}

impl Configuration {
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout.unwrap_or(DEFAULT_TIMEOUT))
    }

    /// Reads the `config.yaml` file from the specified path or the default
    /// location.
    pub fn read(self) -> Arc<Self> {
        let file_path = if self.path.is_file() {
            self.path.clone()
        } else {
            Path::new(DEFAULT_CONFIG_PATH).to_path_buf()
        };

        let file = match File::open(&file_path) {
            Ok(file) => file,
            Err(err) => return Arc::new(self.error(err)),
        };

        match serde_yaml::from_reader::<_, Configuration>(file) {
            Ok(mut config) => {
                // set app version.
                config.version = VERSION.to_owned();
                config.path = file_path;

                Arc::new(config)
            },
            Err(err) => Arc::new(self.error(err)),
        }
    }

    /// Return a default configuration as fallback.
    fn error(&self, err: impl std::error::Error) -> Self {
        tracing::error!(error = %err, path = %self.path.display(), "cannot read configuration file");
        Self {
            path: self.path.clone(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file() {
        let config = Configuration::default()
            .path("/nonexistent/config.yaml")
            .read();

        assert!(config.ldap.is_none());
        assert_eq!(config.version(), VERSION);
        assert_eq!(config.address, DEFAULT_ADDRESS);
    }

    #[test]
    fn test_read() {
        let path = std::env::temp_dir().join(format!("dirauth-{}.yaml", std::process::id()));
        std::fs::write(
            &path,
            r#"
name: example
timeout: 5
ldap:
  host: ldap.example.com
  port: 389
  encryption: start_tls
  connection_user: cn=admin,dc=example
  connection_password: admin
  user_id_field: uid
  email_field: mail
  domain_bases: ou=staff,ou=guests
  user_object_class: inetOrgPerson
  group_object_class: groupOfNames
"#,
        )
        .unwrap();

        let config = Configuration::default().path(&path).read();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.name, "example");
        assert_eq!(config.timeout(), Duration::from_secs(5));
        let ldap = config.ldap.as_ref().unwrap();
        assert_eq!(ldap.encryption.as_deref(), Some("start_tls"));
        assert_eq!(ldap.domain_bases_list(), vec!["ou=staff", "ou=guests"]);

        // Secrets are never written back.
        let json = serde_json::to_string(&*config).unwrap();
        assert!(!json.contains("admin"));
    }
}
