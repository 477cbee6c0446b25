//! Configuration for the migration pipeline

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default call ceiling per rate-limit window
pub const DEFAULT_MAX_CALLS: usize = 20;
/// Default rate-limit window in seconds
pub const DEFAULT_WINDOW_SECS: u64 = 60;

/// Main configuration for a migration run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Remote platform API settings
    pub api: ApiConfig,
    /// Directory holding the record store and diagnostic artifacts
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Remote API client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Platform domain, e.g. `content.example.com`
    pub domain: String,
    /// API key merged into every request's query parameters
    pub api_key: String,
    /// Optional HTTP basic auth user
    #[serde(default)]
    pub http_auth_user: Option<String>,
    /// Optional HTTP basic auth password
    #[serde(default)]
    pub http_auth_pwd: Option<String>,
    /// Max calls per rate-limit window
    #[serde(default = "default_max_calls")]
    pub max_calls: usize,
    /// Rate-limit window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// Request/response logging level (0: silent, 1: method+URL and status,
    /// 2: +bodies on errors, 3: +response bodies on success)
    #[serde(default)]
    pub verbosity: u8,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".pressport")
}

fn default_max_calls() -> usize {
    DEFAULT_MAX_CALLS
}

fn default_window_secs() -> u64 {
    DEFAULT_WINDOW_SECS
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            domain: String::new(),
            api_key: String::new(),
            http_auth_user: None,
            http_auth_pwd: None,
            max_calls: DEFAULT_MAX_CALLS,
            window_secs: DEFAULT_WINDOW_SECS,
            verbosity: 0,
        }
    }
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            data_dir: default_data_dir(),
        }
    }
}

impl MigrationConfig {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;
        let config: MigrationConfig = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration fields.
    ///
    /// Collects all validation errors and reports them together so the user
    /// can fix everything in one pass.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if self.api.domain.is_empty() {
            errors.push("api.domain must not be empty".to_string());
        }
        if self.api.api_key.is_empty() {
            errors.push("api.api_key must not be empty".to_string());
        }
        if self.api.max_calls == 0 {
            errors.push("api.max_calls must be positive".to_string());
        }
        if self.api.window_secs == 0 {
            errors.push("api.window_secs must be positive".to_string());
        }
        if self.api.http_auth_user.is_some() != self.api.http_auth_pwd.is_some() {
            errors.push(
                "api.http_auth_user and api.http_auth_pwd must be set together".to_string(),
            );
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!("Invalid configuration:\n  - {}", errors.join("\n  - "))
        }
    }
}
