//! Connection settings of each tier.
//!
//! Settings come from a JSON file using the keys `host`, `port`, `dbHost`,
//! `dbPort`, `user`, `password` and `dbName`. Missing keys take defaults and
//! unknown keys are ignored, so the three tiers can share one file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::{JHelpError, Result};

/// Default port of the relay server.
pub const DEFAULT_SERVER_PORT: u16 = 16105;
/// Default port of the persistence tier.
pub const DEFAULT_DATABASE_PORT: u16 = 16106;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_DB_NAME: &str = "jhelp.db";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_server_port() -> u16 {
    DEFAULT_SERVER_PORT
}

fn default_database_port() -> u16 {
    DEFAULT_DATABASE_PORT
}

fn default_db_name() -> PathBuf {
    PathBuf::from(DEFAULT_DB_NAME)
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// Read a config file, or the defaults when `path` is `None`.
pub fn load<T: DeserializeOwned>(path: Option<&Path>) -> Result<T> {
    let text = match path {
        Some(path) => fs::read_to_string(path)
            .map_err(|e| JHelpError::Config(format!("{}: {e}", path.display())))?,
        None => "{}".to_string(),
    };
    serde_json::from_str(&text).map_err(|e| JHelpError::Config(e.to_string()))
}

/// Settings of the front-end.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// Relay server host.
    #[serde(default = "default_host")]
    pub host: String,
    /// Relay server port.
    #[serde(default = "default_server_port")]
    pub port: u16,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_server_port(),
        }
    }
}

impl ClientConfig {
    /// Address of the relay server.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Settings of the relay server.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RelayConfig {
    /// Interface the relay listens on.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port the relay listens on.
    #[serde(default = "default_server_port")]
    pub port: u16,
    /// Persistence tier host.
    #[serde(default = "default_host")]
    pub db_host: String,
    /// Persistence tier port.
    #[serde(default = "default_database_port")]
    pub db_port: u16,
    /// Bound on one downstream round trip in seconds, `0` waits forever.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_server_port(),
            db_host: default_host(),
            db_port: default_database_port(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl RelayConfig {
    /// Address the relay listens on.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Address of the persistence tier.
    pub fn db_addr(&self) -> String {
        format!("{}:{}", self.db_host, self.db_port)
    }

    /// The downstream round-trip timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

/// Settings of the persistence tier.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DbConfig {
    /// Interface the persistence tier listens on.
    #[serde(default = "default_host")]
    pub db_host: String,
    /// Port the persistence tier listens on.
    #[serde(default = "default_database_port")]
    pub db_port: u16,
    /// SQLite database file.
    #[serde(default = "default_db_name")]
    pub db_name: PathBuf,
    /// Accepted for compatibility, SQLite has no accounts.
    #[serde(default)]
    pub user: Option<String>,
    /// Accepted for compatibility, SQLite has no accounts.
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            db_host: default_host(),
            db_port: default_database_port(),
            db_name: default_db_name(),
            user: None,
            password: None,
        }
    }
}

impl DbConfig {
    /// Address the persistence tier listens on.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.db_host, self.db_port)
    }
}
