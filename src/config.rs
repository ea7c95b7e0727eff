//! Configuration for lexis
//!
//! Read from `config.toml` in the data directory. Every field has a
//! default, so a missing file or a partial one is fine.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Environment variable pointing at an explicit data directory
pub const HOME_ENV: &str = "LEXIS_HOME";

/// Environment override for `learner.default_language`
pub const LANGUAGE_ENV: &str = "LEXIS_DEFAULT_LANGUAGE";

/// Written by `lexis init`
pub const DEFAULT_CONFIG: &str = r#"# lexis configuration

[session]
# Items per session when --size is not given
default_size = 20

[learner]
# Target language for learners who have not chosen one
default_language = "it"

[storage]
# How long a store call waits on a locked database, in milliseconds
busy_timeout_ms = 5000
"#;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub session: SessionConfig,
    pub learner: LearnerConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub default_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { default_size: 20 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnerConfig {
    pub default_language: String,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            default_language: "it".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { busy_timeout_ms: 5000 }
    }
}

impl StorageConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults
    pub fn load(config_path: &Path) -> Result<Self> {
        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(config_path)?;
            toml::from_str(&content)?
        } else {
            debug!("No config at {:?}, using defaults", config_path);
            Config::default()
        };

        if let Ok(language) = std::env::var(LANGUAGE_ENV) {
            if !language.is_empty() {
                config.learner.default_language = language;
            }
        }

        Ok(config)
    }
}

/// Data directory: `$LEXIS_HOME`, then `./.lexis` if present, then `~/.lexis`
pub fn data_dir() -> Result<PathBuf> {
    if let Ok(home) = std::env::var(HOME_ENV) {
        if !home.is_empty() {
            return Ok(PathBuf::from(home));
        }
    }

    // Check for .lexis directory in current project first
    let cwd = std::env::current_dir()?;
    let project_dir = cwd.join(".lexis");
    if project_dir.exists() {
        return Ok(project_dir);
    }

    // Fall back to home directory
    let home = dirs::home_dir().ok_or_else(|| anyhow!("Could not find home directory"))?;
    Ok(home.join(".lexis"))
}
