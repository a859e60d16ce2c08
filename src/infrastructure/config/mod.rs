//! Configuration management

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{RwLock, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::application::errors::ConfigError;
use crate::application::kernel::KernelOptions;
use crate::domain::traits::ConfigProvider;

/// Bot configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    pub bot: BotConfig,
    pub cache: CacheConfig,
    pub scheduler: SchedulerConfig,
    pub errors: ErrorsConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct BotConfig {
    pub name: String,
    pub prefix: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: "bot-kernel".to_string(),
            prefix: ".".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CacheConfig {
    pub max_size: usize,
    pub default_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            default_ttl_secs: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SchedulerConfig {
    pub maintenance_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            maintenance_interval_secs: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ErrorsConfig {
    pub dedup_window_secs: u64,
}

impl Default for ErrorsConfig {
    fn default() -> Self {
        Self { dedup_window_secs: 60 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SecurityConfig {
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub max_requests: u32,
    pub window_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 20,
            window_seconds: 60,
        }
    }
}

impl Config {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| ConfigError::Parse(format!("Failed to read config: {}", e)))?;

        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(content)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults with `BOT_PREFIX` / `BOT_NAME` applied
    pub fn load_env() -> Self {
        let mut config = Config::default();
        config.apply_env();
        config
    }

    pub fn apply_env(&mut self) {
        if let Ok(prefix) = std::env::var("BOT_PREFIX") {
            self.bot.prefix = prefix;
        }
        if let Ok(name) = std::env::var("BOT_NAME") {
            self.bot.name = name;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bot.prefix.is_empty() || self.bot.prefix.chars().any(char::is_whitespace) {
            return Err(ConfigError::InvalidValue(format!(
                "bot.prefix must be non-empty without whitespace, got {:?}",
                self.bot.prefix
            )));
        }
        if self.cache.max_size == 0 {
            return Err(ConfigError::InvalidValue("cache.max-size must be at least 1".to_string()));
        }
        if self.scheduler.maintenance_interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "scheduler.maintenance-interval-secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::Parse(format!("Failed to serialize config: {}", e)))
    }

    /// Runtime knobs for the kernel
    pub fn kernel_options(&self) -> KernelOptions {
        KernelOptions {
            prefix: self.bot.prefix.clone(),
            cache_max_size: self.cache.max_size,
            cache_default_ttl: Duration::from_secs(self.cache.default_ttl_secs),
            maintenance_interval: Duration::from_secs(self.scheduler.maintenance_interval_secs),
            dedup_window: Duration::from_secs(self.errors.dedup_window_secs),
        }
    }
}

/// In-memory [`ConfigProvider`] keyed by dotted names
#[derive(Debug, Default)]
pub struct MemoryConfig {
    values: RwLock<HashMap<String, Value>>,
}

impl MemoryConfig {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigProvider for MemoryConfig {
    fn get(&self, key: &str, default: Value) -> Value {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .unwrap_or(default)
    }

    fn set(&self, key: &str, value: Value) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
    }
}
