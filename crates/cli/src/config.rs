use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

use chronicle_sources::{SourcesConfig, CHROME_SOURCE};

/// CLI configuration loaded from TOML file.
///
/// Database path, lookback and retention come from the environment
/// (`chronicle_core::Config`); this file holds the sources to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub sources: SourcesConfig,
}

/// Where Chrome keeps the default profile's history on this platform.
fn default_chrome_history() -> &'static str {
    if cfg!(target_os = "macos") {
        "~/Library/Application Support/Google/Chrome/Default/History"
    } else if cfg!(target_os = "windows") {
        "~/AppData/Local/Google/Chrome/User Data/Default/History"
    } else {
        "~/.config/google-chrome/Default/History"
    }
}

impl Default for CliConfig {
    fn default() -> Self {
        let mut options = IndexMap::new();
        options.insert(
            CHROME_SOURCE.to_string(),
            serde_json::json!({ "history_paths": [default_chrome_history()] }),
        );
        Self {
            sources: SourcesConfig {
                enabled: vec![CHROME_SOURCE.to_string()],
                options,
            },
        }
    }
}

impl CliConfig {
    /// Return the default config directory path: ~/.config/chronicle/
    pub fn default_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("could not determine user config directory")?
            .join("chronicle");
        Ok(config_dir)
    }

    /// Return the default config file path.
    pub fn default_config_path() -> Result<PathBuf> {
        Ok(Self::default_config_dir()?.join("config.toml"))
    }

    /// Load config from the given path, or the default path.
    /// Returns default config if the file does not exist.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let config_path = match path {
            Some(p) => PathBuf::from(p),
            None => Self::default_config_path()?,
        };

        if config_path.exists() {
            debug!(?config_path, "Loading config");
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("failed to read config: {}", config_path.display()))?;
            let config: Self = toml::from_str(&content)
                .with_context(|| format!("failed to parse config: {}", config_path.display()))?;
            Ok(config)
        } else {
            debug!(?config_path, "Config file not found, using defaults");
            let config = Self::default();
            // Create directory and write default config
            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent).ok();
            }
            let toml_str = toml::to_string_pretty(&config)
                .context("failed to serialize default config")?;
            std::fs::write(&config_path, toml_str).ok();
            Ok(config)
        }
    }
}
