//! CLI configuration

use std::path::{Path, PathBuf};

use anyhow::Context;
use cairn_core::ManagerConfig;
use serde::{Deserialize, Serialize};

/// Environment variable overriding the config file location
pub const CONFIG_ENV: &str = "CAIRN_CONFIG";

/// Get default data directory
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".cairn")
}

/// Location of the config file
pub fn config_file_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| default_data_dir().join("config.toml"))
}

/// Configuration for the CLI, stored as TOML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the database
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// Default output format
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    pub manager: ManagerConfig,
}

impl Config {
    /// Load the config file, falling back to defaults if it is missing or unreadable
    pub fn load() -> Self {
        let path = config_file_path();
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Ignoring config at {}: {:#}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&config_file_path())
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    /// Data directory from the config, or the default
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(default_data_dir)
    }

    /// Keys accepted by `get` and `set`
    pub fn keys() -> &'static [&'static str] {
        &[
            "data_dir",
            "format",
            "auto_save",
            "max_snapshots",
            "min_pattern_frequency",
            "inference_threshold",
            "weak_connection_threshold",
            "stale_after_days",
            "high_relevance_threshold",
            "low_confidence_threshold",
            "max_suggestions",
            "relevance_half_life_days",
        ]
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let intelligence = &self.manager.intelligence;
        let value = match key {
            "data_dir" => self.data_dir().display().to_string(),
            "format" => self.format.clone().unwrap_or_else(|| "json".to_string()),
            "auto_save" => self.manager.auto_save.to_string(),
            "max_snapshots" => self.manager.max_snapshots.to_string(),
            "min_pattern_frequency" => intelligence.min_pattern_frequency.to_string(),
            "inference_threshold" => intelligence.inference_threshold.to_string(),
            "weak_connection_threshold" => intelligence.weak_connection_threshold.to_string(),
            "stale_after_days" => intelligence.stale_after_days.to_string(),
            "high_relevance_threshold" => intelligence.high_relevance_threshold.to_string(),
            "low_confidence_threshold" => intelligence.low_confidence_threshold.to_string(),
            "max_suggestions" => intelligence.max_suggestions.to_string(),
            "relevance_half_life_days" => intelligence.relevance_half_life_days.to_string(),
            _ => return None,
        };
        Some(value)
    }

    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let intelligence = &mut self.manager.intelligence;
        match key {
            "data_dir" => self.data_dir = Some(PathBuf::from(value)),
            "format" => {
                if !matches!(value, "json" | "text") {
                    anyhow::bail!("format must be 'json' or 'text', got '{}'", value);
                }
                self.format = Some(value.to_string());
            }
            "auto_save" => self.manager.auto_save = parse(key, value)?,
            "max_snapshots" => self.manager.max_snapshots = parse(key, value)?,
            "min_pattern_frequency" => intelligence.min_pattern_frequency = parse(key, value)?,
            "inference_threshold" => intelligence.inference_threshold = unit(key, value)?,
            "weak_connection_threshold" => {
                intelligence.weak_connection_threshold = unit(key, value)?
            }
            "stale_after_days" => intelligence.stale_after_days = parse(key, value)?,
            "high_relevance_threshold" => intelligence.high_relevance_threshold = unit(key, value)?,
            "low_confidence_threshold" => intelligence.low_confidence_threshold = unit(key, value)?,
            "max_suggestions" => intelligence.max_suggestions = parse(key, value)?,
            "relevance_half_life_days" => {
                intelligence.relevance_half_life_days = parse(key, value)?
            }
            _ => anyhow::bail!(
                "Unknown config key: {}. Available keys: {}",
                key,
                Self::keys().join(", ")
            ),
        }
        Ok(())
    }
}

impl Config {
    /// Put one key back to its default value
    pub fn reset(&mut self, key: &str) -> anyhow::Result<()> {
        let defaults = Config::default();
        match key {
            "data_dir" => self.data_dir = None,
            "format" => self.format = None,
            _ => match defaults.get(key) {
                Some(value) => self.set(key, &value)?,
                None => anyhow::bail!(
                    "Unknown config key: {}. Available keys: {}",
                    key,
                    Self::keys().join(", ")
                ),
            },
        }
        Ok(())
    }
}

fn parse<T>(key: &str, value: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid value '{}' for {}: {}", value, key, e))
}

fn unit(key: &str, value: &str) -> anyhow::Result<f64> {
    let parsed: f64 = parse(key, value)?;
    if !(0.0..=1.0).contains(&parsed) {
        anyhow::bail!("{} must be between 0 and 1, got {}", key, parsed);
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_every_key_round_trips() {
        let config = Config::default();
        for key in Config::keys() {
            assert!(config.get(key).is_some(), "missing getter for {key}");
        }
        assert!(config.get("nope").is_none());
    }

    #[test]
    fn test_set_validates_values() {
        let mut config = Config::default();
        config.set("max_snapshots", "3").unwrap();
        config.set("inference_threshold", "0.8").unwrap();
        assert_eq!(config.manager.max_snapshots, 3);
        assert_eq!(config.manager.intelligence.inference_threshold, 0.8);

        assert!(config.set("inference_threshold", "1.5").is_err());
        assert!(config.set("auto_save", "maybe").is_err());
        assert!(config.set("format", "csv").is_err());
        assert!(config.set("unknown", "1").is_err());
    }

    #[test]
    fn test_reset_restores_defaults() {
        let mut config = Config::default();
        config.set("max_suggestions", "3").unwrap();
        config.set("format", "text").unwrap();

        config.reset("max_suggestions").unwrap();
        config.reset("format").unwrap();
        assert_eq!(config, Config::default());
        assert!(config.reset("nope").is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.set("auto_save", "false").unwrap();
        config.set("data_dir", "/tmp/cairn-data").unwrap();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        assert!(!loaded.manager.auto_save);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[manager.intelligence]\nmax_suggestions = 5\n").unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.manager.intelligence.max_suggestions, 5);
        assert_eq!(loaded.manager.max_snapshots, 10);
        assert!(loaded.manager.auto_save);
    }
}
