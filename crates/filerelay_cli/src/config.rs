use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use filerelay_contract::DISCORD_WEBHOOK_PREFIX;
use filerelay_gateway::GatewayConfig;
use filerelay_storage::{StorageConfig, DEFAULT_HISTORY_CAPACITY};
use filerelay_transfer::DEFAULT_MAX_FILE_SIZE;
use filerelay_transport::HttpTransportConfig;
use serde::Deserialize;

pub const ENV_WEBHOOK_URL: &str = "DISCORD_WEBHOOK_URL";
pub const ENV_API_KEY: &str = "FILERELAY_API_KEY";
pub const ENV_BIND: &str = "FILERELAY_BIND";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub http: HttpSection,
    pub discord: DiscordSection,
    pub limits: LimitsSection,
    pub staging: StagingSection,
    pub history: HistorySection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpSection {
    pub bind: String,
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiscordSection {
    pub webhook_url: Option<String>,
    pub api_key: Option<String>,
    pub webhook_prefix: String,
}

impl Default for DiscordSection {
    fn default() -> Self {
        Self {
            webhook_url: None,
            api_key: None,
            webhook_prefix: DISCORD_WEBHOOK_PREFIX.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsSection {
    pub max_file_size: u64,
    pub fetch_timeout_secs: u64,
    pub webhook_timeout_secs: u64,
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            fetch_timeout_secs: 60,
            webhook_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StagingSection {
    pub scratch_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HistorySection {
    pub capacity: usize,
}

impl Default for HistorySection {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

impl RuntimeConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml(&source)
            .with_context(|| format!("invalid config TOML at {}", path.display()))
    }

    pub fn from_toml(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }

    /// Environment values win over the file. Empty values clear the setting.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_WEBHOOK_URL) {
            self.discord.webhook_url = non_empty(url);
        }
        if let Some(key) = lookup(ENV_API_KEY) {
            self.discord.api_key = non_empty(key);
        }
        if let Some(bind) = lookup(ENV_BIND).and_then(non_empty) {
            self.http.bind = bind;
        }
    }

    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            discord_webhook_url: self.discord.webhook_url.clone().and_then(non_empty),
            api_key: self.discord.api_key.clone().and_then(non_empty),
            webhook_prefix: self.discord.webhook_prefix.clone(),
            max_file_size: self.limits.max_file_size,
        }
    }

    pub fn transport_config(&self) -> HttpTransportConfig {
        HttpTransportConfig {
            fetch_timeout: Duration::from_secs(self.limits.fetch_timeout_secs),
            webhook_timeout: Duration::from_secs(self.limits.webhook_timeout_secs),
        }
    }

    pub fn storage_config(&self) -> StorageConfig {
        StorageConfig {
            history_capacity: self.history.capacity,
        }
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.staging
            .scratch_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
