//! Configuration management for focusmode tools

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Global focusmode configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Hosts-editing tool binary (name on PATH or absolute path)
    #[serde(default = "default_hosts_tool")]
    pub hosts_tool: String,

    /// Address blocked domains are redirected to
    #[serde(default = "default_redirect_ip")]
    pub redirect_ip: String,

    /// Marker entry whose state tells which mode the hosts file is in
    #[serde(default = "default_sentinel_domain")]
    pub sentinel_domain: String,

    /// Attempts per tool invocation when the hosts file is busy
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// First backoff delay in milliseconds (doubles on each retry)
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Overrides the data directory for session and blocklist files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

fn default_hosts_tool() -> String {
    "hostess".to_string()
}

fn default_redirect_ip() -> String {
    "127.0.0.1".to_string()
}

fn default_sentinel_domain() -> String {
    "focusmode.sentinel.invalid".to_string()
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hosts_tool: default_hosts_tool(),
            redirect_ip: default_redirect_ip(),
            sentinel_domain: default_sentinel_domain(),
            retry_attempts: default_retry_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            data_dir: None,
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            let config = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config: {}", path.display()))?;
            tracing::debug!(path = %path.display(), "loaded config");
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
