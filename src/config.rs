//! Configuration management for treewatch
//!
//! Settings come from defaults, an optional TOML file, environment
//! variables, and finally command line flags, each overriding the last.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Global configuration for treewatch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreewatchConfig {
    /// How each root is watched
    pub watch: WatchSettings,
    /// Which entries are tracked
    pub filter: FilterSettings,
}

/// Configuration for watching a root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchSettings {
    /// Descend into subdirectories
    pub recursive: bool,
    /// Seconds between full resyncs against the filesystem; 0 disables them
    pub resync_interval_secs: u64,
    /// Report the root itself in the initial batch
    pub include_root_event: bool,
}

/// Configuration for entry filtering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    /// Apply the root's .gitignore and .ignore files
    pub respect_gitignore: bool,
    /// Track entries whose name starts with a dot
    pub include_hidden: bool,
    /// Extra patterns in gitignore syntax
    pub ignore_patterns: Vec<String>,
    /// Regular expressions matched against full paths
    pub exclude_regex: Vec<String>,
    /// File extensions to track; empty tracks every file
    pub extensions: Vec<String>,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            recursive: true,
            resync_interval_secs: 0,
            include_root_event: true,
        }
    }
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            respect_gitignore: true,
            include_hidden: true,
            ignore_patterns: Vec::new(),
            exclude_regex: Vec::new(),
            extensions: Vec::new(),
        }
    }
}

impl WatchSettings {
    /// Get periodic resync interval, if enabled
    pub fn resync_interval(&self) -> Option<Duration> {
        (self.resync_interval_secs > 0).then(|| Duration::from_secs(self.resync_interval_secs))
    }
}

/// Configuration loading and management
impl TreewatchConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load from file when given, otherwise defaults, then apply environment overrides
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        Ok(config.with_env_overrides())
    }

    /// Override with environment variables if present
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(recursive) = env_bool("TREEWATCH_RECURSIVE") {
            self.watch.recursive = recursive;
        }

        if let Ok(val) = std::env::var("TREEWATCH_RESYNC_INTERVAL_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                self.watch.resync_interval_secs = secs;
            }
        }

        if let Some(respect) = env_bool("TREEWATCH_RESPECT_GITIGNORE") {
            self.filter.respect_gitignore = respect;
        }

        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        for pattern in &self.filter.exclude_regex {
            if let Err(err) = regex::Regex::new(pattern) {
                return Err(format!("invalid exclude_regex {:?}: {}", pattern, err));
            }
        }

        if self.filter.extensions.iter().any(|e| e.trim_start_matches('.').is_empty()) {
            return Err("extensions must not be empty strings".to_string());
        }

        Ok(())
    }
}

fn env_bool(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    match val.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = TreewatchConfig::default();

        assert!(config.watch.recursive);
        assert_eq!(config.watch.resync_interval(), None);
        assert!(config.filter.respect_gitignore);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = TreewatchConfig::from_toml(
            r#"
            [watch]
            resync_interval_secs = 30

            [filter]
            extensions = ["rs", "toml"]
            "#,
        )
        .unwrap();

        assert!(config.watch.recursive);
        assert_eq!(config.watch.resync_interval(), Some(Duration::from_secs(30)));
        assert_eq!(config.filter.extensions, vec!["rs", "toml"]);
        assert!(config.filter.include_hidden);
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("treewatch.toml");
        std::fs::write(&path, "[watch]\nrecursive = false\n").unwrap();

        let config = TreewatchConfig::load(&path).unwrap();
        assert!(!config.watch.recursive);

        assert!(TreewatchConfig::load(&temp_dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_config_validation() {
        let mut config = TreewatchConfig::default();
        config.filter.exclude_regex = vec!["(".to_string()];
        assert!(config.validate().is_err());

        config.filter.exclude_regex.clear();
        config.filter.extensions = vec![".".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_config_loading() {
        std::env::set_var("TREEWATCH_RESYNC_INTERVAL_SECS", "120");
        std::env::set_var("TREEWATCH_RESPECT_GITIGNORE", "off");

        let config = TreewatchConfig::default().with_env_overrides();

        assert_eq!(config.watch.resync_interval_secs, 120);
        assert!(!config.filter.respect_gitignore);

        // Cleanup
        std::env::remove_var("TREEWATCH_RESYNC_INTERVAL_SECS");
        std::env::remove_var("TREEWATCH_RESPECT_GITIGNORE");
    }
}
