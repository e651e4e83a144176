//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Graphsync configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub database: DatabaseSettings,
}

/// Graph synchronization tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Documents with this many failed attempts are skipped by reconciliation
    pub max_attempts: u32,
    pub extraction_timeout_secs: u64,
    pub graph_timeout_secs: u64,
    /// How long the ingestion path waits for a document's sync lock
    pub lock_timeout_secs: u64,
    pub reconcile_batch_size: usize,
    pub reconcile_interval_secs: u64,
    /// Base delay between reconciliation retries of one document (0 = no backoff)
    pub retry_backoff_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    #[serde(skip)]
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: usize,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file; defaults to `graphsync.db` in the config directory
    pub path: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            extraction_timeout_secs: 60,
            graph_timeout_secs: 15,
            lock_timeout_secs: 30,
            reconcile_batch_size: 50,
            reconcile_interval_secs: 300,
            retry_backoff_secs: 0,
        }
    }
}

impl SyncConfig {
    pub fn extraction_timeout(&self) -> Duration {
        Duration::from_secs(self.extraction_timeout_secs)
    }

    pub fn graph_timeout(&self) -> Duration {
        Duration::from_secs(self.graph_timeout_secs)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }

    /// Minimum wait before retrying a document that has failed `attempts` times
    pub fn backoff_for(&self, attempts: u32) -> Duration {
        if self.retry_backoff_secs == 0 || attempts == 0 {
            return Duration::ZERO;
        }
        let factor = 1u64 << (attempts - 1).min(16);
        Duration::from_secs(self.retry_backoff_secs.saturating_mul(factor))
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.0,
            max_tokens: 2048,
            timeout_secs: 120,
        }
    }
}

impl LlmConfig {
    pub fn resolved_api_key(&self) -> anyhow::Result<Option<String>> {
        self.enforce_env_only()?;

        Ok(env::var("GRAPHSYNC_API_KEY")
            .or_else(|_| env::var("OPENAI_API_KEY"))
            .ok())
    }

    pub fn redacted_api_key(&self) -> anyhow::Result<Option<String>> {
        self.resolved_api_key().map(|opt| {
            opt.map(|key| {
                if key.len() <= 4 {
                    "***".to_string()
                } else {
                    let suffix = &key[key.len() - 4..];
                    format!("***{}", suffix)
                }
            })
        })
    }

    pub fn enforce_env_only(&self) -> anyhow::Result<()> {
        if self.api_key.is_some() {
            return Err(anyhow!(
                "LLM API keys must be provided via environment variables, not stored in configuration"
            ));
        }
        Ok(())
    }
}

/// Keys understood by `get`, `set` and `list`, in listing order
const KEYS: &[&str] = &[
    "sync.max_attempts",
    "sync.extraction_timeout_secs",
    "sync.graph_timeout_secs",
    "sync.lock_timeout_secs",
    "sync.reconcile_batch_size",
    "sync.reconcile_interval_secs",
    "sync.retry_backoff_secs",
    "llm.base_url",
    "llm.model",
    "llm.temperature",
    "llm.max_tokens",
    "llm.timeout_secs",
    "llm.api_key",
    "database.path",
];

impl Config {
    /// `GRAPHSYNC_CONFIG_DIR`, or `graphsync/` under the platform config dir
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        if let Ok(dir) = env::var("GRAPHSYNC_CONFIG_DIR") {
            return Ok(PathBuf::from(dir));
        }
        dirs::config_dir()
            .map(|dir| dir.join("graphsync"))
            .ok_or_else(|| anyhow!("Could not determine config directory"))
    }

    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Database file, defaulting to `graphsync.db` beside the config file
    pub fn database_path(&self) -> anyhow::Result<PathBuf> {
        match &self.database.path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::config_dir()?.join("graphsync.db")),
        }
    }

    /// Read the config file; a missing file means defaults
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        self.validate()?;

        let path = Self::config_path()?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        }
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.llm.enforce_env_only()?;

        let sync = &self.sync;
        if sync.max_attempts == 0 {
            return Err(anyhow!("sync.max_attempts must be at least 1"));
        }
        if sync.extraction_timeout_secs == 0 || sync.graph_timeout_secs == 0 || sync.lock_timeout_secs == 0 {
            return Err(anyhow!("sync timeouts must be greater than zero"));
        }
        if sync.reconcile_batch_size == 0 {
            return Err(anyhow!("sync.reconcile_batch_size must be at least 1"));
        }
        if sync.reconcile_interval_secs == 0 {
            return Err(anyhow!("sync.reconcile_interval_secs must be at least 1"));
        }
        Ok(())
    }

    /// Value of a dotted key; the API key is shown redacted
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        let sync = &self.sync;
        let llm = &self.llm;
        Ok(match key {
            "sync.max_attempts" => sync.max_attempts.to_string(),
            "sync.extraction_timeout_secs" => sync.extraction_timeout_secs.to_string(),
            "sync.graph_timeout_secs" => sync.graph_timeout_secs.to_string(),
            "sync.lock_timeout_secs" => sync.lock_timeout_secs.to_string(),
            "sync.reconcile_batch_size" => sync.reconcile_batch_size.to_string(),
            "sync.reconcile_interval_secs" => sync.reconcile_interval_secs.to_string(),
            "sync.retry_backoff_secs" => sync.retry_backoff_secs.to_string(),
            "llm.base_url" => llm.base_url.clone(),
            "llm.model" => llm.model.clone(),
            "llm.temperature" => llm.temperature.to_string(),
            "llm.max_tokens" => llm.max_tokens.to_string(),
            "llm.timeout_secs" => llm.timeout_secs.to_string(),
            "llm.api_key" | "api_key" => llm.redacted_api_key()?.unwrap_or_else(|| {
                "(not set - use GRAPHSYNC_API_KEY or OPENAI_API_KEY env var)".to_string()
            }),
            "database.path" => self.database_path()?.display().to_string(),
            _ => return Err(unknown_key(key)),
        })
    }

    /// Set a dotted key from its string form
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let sync = &mut self.sync;
        let llm = &mut self.llm;
        match key {
            "sync.max_attempts" => sync.max_attempts = parse_at_least_one(key, value)?,
            "sync.extraction_timeout_secs" => sync.extraction_timeout_secs = parse_at_least_one(key, value)?,
            "sync.graph_timeout_secs" => sync.graph_timeout_secs = parse_at_least_one(key, value)?,
            "sync.lock_timeout_secs" => sync.lock_timeout_secs = parse_at_least_one(key, value)?,
            "sync.reconcile_batch_size" => sync.reconcile_batch_size = parse_at_least_one(key, value)?,
            "sync.reconcile_interval_secs" => sync.reconcile_interval_secs = parse_at_least_one(key, value)?,
            "sync.retry_backoff_secs" => sync.retry_backoff_secs = parse_setting(key, value)?,
            "llm.base_url" => {
                if !value.starts_with("http://") && !value.starts_with("https://") {
                    return Err(anyhow!("llm.base_url must start with http:// or https://"));
                }
                llm.base_url = value.trim_end_matches('/').to_string();
            }
            "llm.model" => llm.model = value.to_string(),
            "llm.temperature" => {
                let temperature: f32 = parse_setting(key, value)?;
                if !(0.0..=2.0).contains(&temperature) {
                    return Err(anyhow!("llm.temperature must be between 0.0 and 2.0"));
                }
                llm.temperature = temperature;
            }
            "llm.max_tokens" => llm.max_tokens = parse_at_least_one(key, value)?,
            "llm.timeout_secs" => llm.timeout_secs = parse_at_least_one(key, value)?,
            "database.path" => self.database.path = Some(PathBuf::from(value)),
            "llm.api_key" | "api_key" => {
                return Err(anyhow!(
                    "API keys cannot be stored in configuration. \
                     Set the GRAPHSYNC_API_KEY or OPENAI_API_KEY environment variable instead."
                ));
            }
            _ => return Err(unknown_key(key)),
        }
        Ok(())
    }

    /// Every key with its current value
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        KEYS.iter()
            .map(|key| Ok((key.to_string(), self.get(key)?)))
            .collect()
    }

    /// Delete the config file so defaults apply
    pub fn reset() -> anyhow::Result<()> {
        let path = Self::config_path()?;
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove config file: {}", path.display()))?;
        }
        Ok(())
    }
}

fn unknown_key(key: &str) -> anyhow::Error {
    anyhow!(
        "Unknown configuration key: {}. Use `graphsync config list` to see available keys.",
        key
    )
}

fn parse_setting<T: FromStr>(key: &str, value: &str) -> anyhow::Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| anyhow!("Invalid value for {}: {}", key, value))
}

fn parse_at_least_one<T: FromStr + PartialOrd + From<u8>>(key: &str, value: &str) -> anyhow::Result<T> {
    let parsed: T = parse_setting(key, value)?;
    if parsed < T::from(1) {
        return Err(anyhow!("{} must be at least 1", key));
    }
    Ok(parsed)
}
