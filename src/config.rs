use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::observability::LogFormat;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    #[serde(default = "default_year_min")]
    pub year_min: i32,
    #[serde(default = "default_year_max")]
    pub year_max: i32,
    #[serde(default = "default_parts_limit")]
    pub parts_limit: usize,
    #[serde(default = "default_tree_years")]
    pub tree_years: usize,
    #[serde(default = "default_tree_concurrency")]
    pub tree_concurrency: usize,
    #[serde(default = "default_tree_model_timeout_ms")]
    pub tree_model_timeout_ms: u64,
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
    /// Last-resort year lookup by the numeric token of a model name.
    #[serde(default)]
    pub numeric_token_fallback: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            year_min: default_year_min(),
            year_max: default_year_max(),
            parts_limit: default_parts_limit(),
            tree_years: default_tree_years(),
            tree_concurrency: default_tree_concurrency(),
            tree_model_timeout_ms: default_tree_model_timeout_ms(),
            store_timeout_ms: default_store_timeout_ms(),
            numeric_token_fallback: false,
        }
    }
}

fn default_year_min() -> i32 {
    1950
}
fn default_year_max() -> i32 {
    2030
}
fn default_parts_limit() -> usize {
    50
}
fn default_tree_years() -> usize {
    20
}
fn default_tree_concurrency() -> usize {
    4
}
fn default_tree_model_timeout_ms() -> u64 {
    10_000
}
fn default_store_timeout_ms() -> u64 {
    5_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// How often the server checks for a newer snapshot load or link pass.
    #[serde(default = "default_reload_check_ms")]
    pub reload_check_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            reload_check_ms: default_reload_check_ms(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_reload_check_ms() -> u64 {
    2_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct LinkConfig {
    /// A batch lock older than this is treated as abandoned and taken over.
    #[serde(default = "default_lock_ttl_secs")]
    pub lock_ttl_secs: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            lock_ttl_secs: default_lock_ttl_secs(),
        }
    }
}

fn default_lock_ttl_secs() -> u64 {
    3_600
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: default_log_format(),
        }
    }
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl LoggingConfig {
    pub fn log_format(&self) -> LogFormat {
        LogFormat::parse(&self.format).unwrap_or_default()
    }
}

impl Config {
    /// All-default configuration with an in-tree database path.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                path: PathBuf::from("./data/ixr.sqlite"),
            },
            engine: EngineConfig::default(),
            cache: CacheConfig::default(),
            link: LinkConfig::default(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    let engine = &config.engine;

    if engine.year_min > engine.year_max {
        anyhow::bail!(
            "engine.year_min ({}) must be <= engine.year_max ({})",
            engine.year_min,
            engine.year_max
        );
    }
    if engine.parts_limit < 1 {
        anyhow::bail!("engine.parts_limit must be >= 1");
    }
    if engine.tree_years < 1 {
        anyhow::bail!("engine.tree_years must be >= 1");
    }
    if engine.tree_concurrency < 1 {
        anyhow::bail!("engine.tree_concurrency must be >= 1");
    }
    if engine.tree_model_timeout_ms == 0 || engine.store_timeout_ms == 0 {
        anyhow::bail!("engine timeouts must be > 0");
    }
    if config.cache.reload_check_ms == 0 {
        anyhow::bail!("cache.reload_check_ms must be > 0");
    }
    if config.link.lock_ttl_secs == 0 {
        anyhow::bail!("link.lock_ttl_secs must be > 0");
    }

    if LogFormat::parse(&config.logging.format).is_none() {
        anyhow::bail!(
            "Unknown logging format: '{}'. Must be pretty or json.",
            config.logging.format
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_sections() {
        let cfg: Config = toml::from_str("[db]\npath = \"x.sqlite\"\n").unwrap();
        assert_eq!(cfg.engine.year_min, 1950);
        assert_eq!(cfg.engine.year_max, 2030);
        assert_eq!(cfg.engine.parts_limit, 50);
        assert_eq!(cfg.engine.tree_years, 20);
        assert!(!cfg.engine.numeric_token_fallback);
        assert!(cfg.cache.enabled);
        assert_eq!(cfg.cache.reload_check_ms, 2_000);
        assert_eq!(cfg.link.lock_ttl_secs, 3_600);
        assert_eq!(cfg.logging.log_format(), LogFormat::Pretty);
        validate(&cfg).unwrap();
    }

    #[test]
    fn test_rejects_inverted_year_bounds() {
        let cfg: Config = toml::from_str(
            "[db]\npath = \"x.sqlite\"\n[engine]\nyear_min = 2030\nyear_max = 1950\n",
        )
        .unwrap();
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn test_rejects_unknown_log_format() {
        let cfg: Config =
            toml::from_str("[db]\npath = \"x.sqlite\"\n[logging]\nformat = \"xml\"\n").unwrap();
        let err = validate(&cfg).unwrap_err().to_string();
        assert!(err.contains("logging format"));
    }

    #[test]
    fn test_rejects_zero_lock_ttl() {
        let cfg: Config =
            toml::from_str("[db]\npath = \"x.sqlite\"\n[link]\nlock_ttl_secs = 0\n").unwrap();
        let err = validate(&cfg).unwrap_err().to_string();
        assert!(err.contains("lock_ttl_secs"));
    }

    #[test]
    fn test_rejects_zero_parts_limit() {
        let cfg: Config =
            toml::from_str("[db]\npath = \"x.sqlite\"\n[engine]\nparts_limit = 0\n").unwrap();
        assert!(validate(&cfg).is_err());
    }
}
