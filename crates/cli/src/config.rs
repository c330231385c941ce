//! CLI configuration utilities

use anyhow::{Context, Result};
use hms_http::ClientConfig;
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "config.toml";
const TOKEN_FILE: &str = "tokens.json";

/// Resolve the state directory: explicit flag, then `HMS_STATE_DIR`, then the
/// platform data directory.
pub fn state_dir(explicit: Option<PathBuf>) -> PathBuf {
    explicit.unwrap_or_else(|| {
        if let Ok(dir) = std::env::var("HMS_STATE_DIR") {
            PathBuf::from(dir)
        } else {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("hms")
        }
    })
}

/// Load client configuration from the given file, or `config.toml` in the
/// state directory when present, with `HMS_*` environment overrides.
pub fn load_client_config(path: Option<&Path>, state_dir: &Path) -> Result<ClientConfig> {
    let default_path = state_dir.join(CONFIG_FILE);
    let path = match path {
        Some(path) => Some(path.to_path_buf()),
        None => default_path.exists().then_some(default_path),
    };

    if let Some(path) = &path {
        tracing::debug!(path = %path.display(), "loading client configuration");
    }

    ClientConfig::load(path.as_deref()).context("failed to load client configuration")
}

/// Token file location: configured path or `tokens.json` in the state directory
pub fn token_file(config: &ClientConfig, state_dir: &Path) -> PathBuf {
    config
        .token_file
        .clone()
        .unwrap_or_else(|| state_dir.join(TOKEN_FILE))
}
