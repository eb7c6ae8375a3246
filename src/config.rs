//! Service configuration loaded from TOML.
//!
//! Every field has a default, so an absent or partial file is fine. The
//! binary layers CLI flags and `EDGESTORE_*` environment variables on top.

use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::relay::DEFAULT_ACK_DEADLINE;
use crate::server::ServerOptions;
use crate::storage::{StoreOptions, DEFAULT_MAX_BATCH_ROWS};

/// Top-level service settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    /// SQLite database file.
    pub database: PathBuf,
    /// HTTP bind address.
    pub host: IpAddr,
    /// HTTP port.
    pub port: u16,
    /// Pooled SQLite connections.
    pub pool_size: usize,
    /// SQLite busy timeout in milliseconds.
    pub busy_timeout_ms: u64,
    /// Rows per INSERT statement.
    pub max_batch_rows: usize,
    /// Log every SQL statement at debug level.
    pub trace_sql: bool,
    /// Relay consumer settings.
    pub relay: RelayConfig,
}

/// Relay consumer settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelayConfig {
    /// JSON-lines feed to consume; `-` is stdin. No relay runs when unset.
    pub input: Option<PathBuf>,
    /// Seconds before an unacknowledged message is redelivered.
    pub ack_deadline_secs: u64,
    /// Messages processed concurrently.
    pub concurrency: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        let server = ServerOptions::default();
        Self {
            database: PathBuf::from("edgestore.db"),
            host: server.host,
            port: server.port,
            pool_size: 4,
            busy_timeout_ms: 5_000,
            max_batch_rows: DEFAULT_MAX_BATCH_ROWS,
            trace_sql: false,
            relay: RelayConfig::default(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            input: None,
            ack_deadline_secs: DEFAULT_ACK_DEADLINE.as_secs(),
            concurrency: 8,
        }
    }
}

impl ServiceConfig {
    /// Loads `explicit`, or the per-user default file when it exists.
    ///
    /// An explicit path that cannot be read is an error; a missing default
    /// file yields the built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => read_file(path),
            None => match default_config_path() {
                Some(path) if path.exists() => read_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    /// Parses TOML text; `origin` is only used in error messages.
    pub fn from_toml(contents: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Storage options for [`crate::EdgeStore::open`].
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions::new(&self.database)
            .pool_size(self.pool_size)
            .busy_timeout(Duration::from_millis(self.busy_timeout_ms))
            .max_batch_rows(self.max_batch_rows)
            .trace_sql(self.trace_sql)
    }

    /// Bind address for the HTTP server.
    pub fn server_options(&self) -> ServerOptions {
        ServerOptions {
            host: self.host,
            port: self.port,
        }
    }
}

impl RelayConfig {
    /// Ack deadline as a [`Duration`].
    pub fn ack_deadline(&self) -> Duration {
        Duration::from_secs(self.ack_deadline_secs.max(1))
    }
}

fn read_file(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    ServiceConfig::from_toml(&contents, path)
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The file is not valid configuration TOML.
    #[error("failed to parse config {path}: {source}")]
    Parse {
        /// File that failed.
        path: PathBuf,
        /// Underlying parse error.
        source: toml::de::Error,
    },
}

/// `$XDG_CONFIG_HOME/edgestore/config.toml` or the platform equivalent.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("edgestore").join("config.toml"))
}
