//! Client configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional TOML
//! file, then `HMS_*` environment variables (`HMS_BASE_URL`,
//! `HMS_REFRESH_ATTEMPTS`, ...).

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Backend root, e.g. `https://hms.example.org/api`
    pub base_url: String,

    /// Per-request timeout in seconds (0 disables it)
    pub timeout_secs: u64,

    pub user_agent: String,

    /// Treat the access token as expired this many seconds early
    pub expiry_margin_secs: u64,

    /// Attempts at reaching the refresh endpoint when the network fails
    pub refresh_attempts: u32,

    /// Linear backoff step between refresh attempts, in milliseconds
    pub refresh_backoff_ms: u64,

    /// Where the CLI keeps the token pair. Defaults to the state directory.
    pub token_file: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api".to_string(),
            timeout_secs: 30,
            user_agent: format!("hms-client/{}", env!("CARGO_PKG_VERSION")),
            expiry_margin_secs: 30,
            refresh_attempts: 3,
            refresh_backoff_ms: 500,
            token_file: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration from defaults, an optional file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        builder = builder.add_source(
            Environment::with_prefix("HMS")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    pub fn expiry_margin(&self) -> Duration {
        Duration::from_secs(self.expiry_margin_secs)
    }

    pub fn refresh_backoff(&self) -> Duration {
        Duration::from_millis(self.refresh_backoff_ms)
    }
}
