//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MAILCONV_CONFIG` (environment variable)
//! 2. `~/.config/mailconv/config.toml` (Linux/macOS)
//!    `%APPDATA%\mailconv\config.toml` (Windows)
//! 3. Built-in defaults

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::toc::DEFAULT_CACHE_SIZE;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Folder table-of-contents settings.
    pub toc: TocConfig,
    /// Windowed list view defaults.
    pub view: ViewConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// Override cache directory for logs.
    pub cache_dir: Option<PathBuf>,
}

/// Folder table-of-contents settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TocConfig {
    /// Number of conversation summaries kept in each TOC's LRU cache.
    pub conversation_cache_size: usize,
    /// Folder listed when none is given on the command line.
    pub default_folder: String,
}

/// Windowed list view defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    /// Rows requested by a top or bottom seek.
    pub window_size: usize,
    /// Rows above the focused conversation.
    pub focus_above: usize,
    /// Rows below the focused conversation.
    pub focus_below: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            cache_dir: None,
        }
    }
}

impl Default for TocConfig {
    fn default() -> Self {
        Self {
            conversation_cache_size: DEFAULT_CACHE_SIZE,
            default_folder: "INBOX".to_string(),
        }
    }
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            window_size: 20,
            focus_above: 5,
            focus_below: 14,
        }
    }
}

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MAILCONV_CONFIG") {
        return Some(PathBuf::from(env_path));
    }
    dirs::config_dir().map(|d| d.join("mailconv").join("config.toml"))
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailconv")
}

/// Return the log file path.
pub fn log_file_path(config: &Config) -> PathBuf {
    cache_dir(config).join("mailconv.log")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.general.log_level, "warn");
        assert_eq!(cfg.toc.conversation_cache_size, DEFAULT_CACHE_SIZE);
        assert_eq!(cfg.toc.default_folder, "INBOX");
        assert_eq!(cfg.view.window_size, 20);
    }

    #[test]
    fn test_serialize_deserialize_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        let parsed: Config = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.toc.default_folder, cfg.toc.default_folder);
        assert_eq!(parsed.view.focus_below, cfg.view.focus_below);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let partial = r#"
[toc]
conversation_cache_size = 8

[view]
focus_above = 2
"#;
        let cfg: Config = toml::from_str(partial).expect("parse partial");
        assert_eq!(cfg.toc.conversation_cache_size, 8);
        assert_eq!(cfg.view.focus_above, 2);
        // Other fields use defaults
        assert_eq!(cfg.toc.default_folder, "INBOX");
        assert_eq!(cfg.view.focus_below, 14);
        assert_eq!(cfg.general.log_level, "warn");
    }

    #[test]
    fn test_cache_dir_override() {
        let mut cfg = Config::default();
        cfg.general.cache_dir = Some(PathBuf::from("/tmp/mailconv-test"));
        assert_eq!(
            log_file_path(&cfg),
            PathBuf::from("/tmp/mailconv-test/mailconv.log")
        );
    }
}
