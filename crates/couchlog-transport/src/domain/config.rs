//! Transport configuration and connection-setting resolution
//!
//! `TransportConfig` is what callers write (serde, builder or environment);
//! `ConnectionSettings` is the resolved form the store adapters consume.
//!
//! # Example
//!
//! ```ignore
//! use couchlog_transport::domain::TransportConfig;
//!
//! let settings = TransportConfig::default()
//!     .with_host("couch.internal")
//!     .with_db("app-logs")
//!     .resolve()?;
//! assert_eq!(settings.url, "http://couch.internal:5984");
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::error::TransportError;

/// Transport type name used when none is configured.
pub const DEFAULT_NAME: &str = "couchdb";

/// Database used when neither `db` nor `database` is set.
pub const DEFAULT_DB: &str = "winston";

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 5984;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Basic-auth credentials passed through to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Auth {
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl Auth {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// How concurrent callers behave while the index is being provisioned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningPolicy {
    /// Only the first caller does the work; everyone else proceeds at once.
    #[default]
    Optimistic,
    /// Later callers wait for the first attempt and share its outcome.
    AwaitCompletion,
}

/// Connection options as supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub name: Option<String>,
    pub db: Option<String>,
    /// Deprecated spelling of `db`.
    pub database: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub auth: Option<Auth>,
    pub secure: bool,
    pub ssl: bool,
    /// Legacy credential pair; wins over `auth` when set.
    pub user: Option<String>,
    pub pass: Option<String>,
    pub silent: bool,
    pub provisioning: ProvisioningPolicy,
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Option<Duration>,
}

impl TransportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `COUCHLOG_*` environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `COUCHLOG_HOST`: Host or URL prefix (default: localhost)
    /// - `COUCHLOG_PORT`: Port (default: 5984)
    /// - `COUCHLOG_DB`: Database name (default: winston)
    /// - `COUCHLOG_USER` / `COUCHLOG_PASS`: Basic-auth credentials
    /// - `COUCHLOG_SECURE`: Require verified TLS (default: false)
    /// - `COUCHLOG_SILENT`: Drop every write (default: false)
    pub fn from_env() -> Result<Self, TransportError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, TransportError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |key: &str| {
            lookup(key)
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(false)
        };

        let port = match lookup("COUCHLOG_PORT") {
            Some(raw) => Some(raw.trim().parse::<u16>().map_err(|e| {
                TransportError::Config(format!("COUCHLOG_PORT '{raw}' is not a port: {e}"))
            })?),
            None => None,
        };

        Ok(Self {
            host: lookup("COUCHLOG_HOST"),
            port,
            db: lookup("COUCHLOG_DB"),
            user: lookup("COUCHLOG_USER"),
            pass: lookup("COUCHLOG_PASS"),
            secure: flag("COUCHLOG_SECURE"),
            silent: flag("COUCHLOG_SILENT"),
            ..Self::default()
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_db(mut self, db: impl Into<String>) -> Self {
        self.db = Some(db.into());
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth = Some(Auth::new(username, password));
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn with_silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    pub fn with_provisioning(mut self, policy: ProvisioningPolicy) -> Self {
        self.provisioning = policy;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn validate(&self) -> Result<(), TransportError> {
        if self.port == Some(0) {
            return Err(TransportError::Config("port cannot be 0".to_string()));
        }

        for (key, value) in [("db", &self.db), ("database", &self.database)] {
            if let Some(name) = value {
                if name.is_empty() {
                    return Err(TransportError::Config(format!("{key} cannot be empty")));
                }
                if name.contains('/') {
                    return Err(TransportError::Config(format!(
                        "{key} '{name}' must not contain '/'"
                    )));
                }
            }
        }

        if self.connect_timeout == Some(Duration::ZERO) {
            return Err(TransportError::Config(
                "connect_timeout must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Validate and apply every default and alias rule.
    pub fn resolve(&self) -> Result<ConnectionSettings, TransportError> {
        self.validate()?;

        let host = match self.host.as_deref().map(str::trim) {
            Some(host) if has_scheme(host) => host.to_string(),
            Some(host) if !host.is_empty() => format!("http://{host}"),
            _ => format!("http://{DEFAULT_HOST}"),
        };
        let port = self.port.unwrap_or(DEFAULT_PORT);
        let secure = host.to_ascii_lowercase().starts_with("https:") || self.secure || self.ssl;

        let auth = match &self.user {
            Some(user) => Some(Auth::new(user.clone(), self.pass.clone().unwrap_or_default())),
            None => self.auth.clone(),
        };

        Ok(ConnectionSettings {
            name: self
                .name
                .clone()
                .unwrap_or_else(|| DEFAULT_NAME.to_string()),
            db: self
                .db
                .clone()
                .or_else(|| self.database.clone())
                .unwrap_or_else(|| DEFAULT_DB.to_string()),
            url: format!("{host}:{port}"),
            host,
            port,
            auth,
            secure,
            silent: self.silent,
            provisioning: self.provisioning,
            connect_timeout: self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT),
        })
    }
}

fn has_scheme(host: &str) -> bool {
    let lower = host.to_ascii_lowercase();
    lower.starts_with("http:") || lower.starts_with("https:")
}

/// Fully resolved connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub name: String,
    pub db: String,
    /// Host including its scheme.
    pub host: String,
    pub port: u16,
    /// `<host>:<port>`
    pub url: String,
    pub auth: Option<Auth>,
    /// Verify TLS certificates strictly.
    pub secure: bool,
    pub silent: bool,
    pub provisioning: ProvisioningPolicy,
    pub connect_timeout: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            db: DEFAULT_DB.to_string(),
            host: format!("http://{DEFAULT_HOST}"),
            port: DEFAULT_PORT,
            url: format!("http://{DEFAULT_HOST}:{DEFAULT_PORT}"),
            auth: None,
            secure: false,
            silent: false,
            provisioning: ProvisioningPolicy::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}
