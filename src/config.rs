//! Configuration loading (`.flockwait.toml`).

use crate::flock::LockMode;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name searched for in the current directory and its ancestors.
pub const CONFIG_FILE_NAME: &str = ".flockwait.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub lock: LockConfig,
    #[serde(default)]
    pub waiter: WaiterConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LockConfig {
    /// Lock taken when no `--shared`/`--exclusive` flag is given
    #[serde(default)]
    pub mode: LockKind,
    /// Create the lock file if it does not exist
    #[serde(default = "default_create")]
    pub create: bool,
}

fn default_create() -> bool {
    true
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            mode: LockKind::default(),
            create: default_create(),
        }
    }
}

/// Lock kinds that can be held
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockKind {
    #[default]
    Exclusive,
    Shared,
}

impl LockKind {
    pub fn mode(self) -> LockMode {
        match self {
            Self::Exclusive => LockMode::Exclusive,
            Self::Shared => LockMode::Shared,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WaiterConfig {
    /// Milliseconds between progress line redraws
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Suppress the progress line entirely
    #[serde(default)]
    pub quiet: bool,
}

fn default_interval_ms() -> u64 {
    1000
}

impl Default for WaiterConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            quiet: false,
        }
    }
}

impl WaiterConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

impl Config {
    /// Load config from file or use defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => std::env::current_dir()
                .ok()
                .and_then(|dir| Self::find_config(&dir)),
        };

        match config_path {
            Some(config_path) if config_path.exists() => Self::from_file(&config_path),
            Some(config_path) if path.is_some() => {
                anyhow::bail!("Config file not found: {}", config_path.display())
            }
            _ => Ok(Config::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;
        Ok(config)
    }

    /// Find config file by walking up directory tree
    fn find_config(start: &Path) -> Option<PathBuf> {
        let mut current = start.to_path_buf();
        loop {
            let config_path = current.join(CONFIG_FILE_NAME);
            if config_path.exists() {
                return Some(config_path);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Generate default config TOML
    pub fn default_toml() -> &'static str {
        r#"[lock]
# Lock taken when neither --shared nor --exclusive is given
# mode = "exclusive"
# Create the lock file if it does not exist
create = true

[waiter]
# Milliseconds between "Waiting for filesystem lock" redraws
interval_ms = 1000
# Do not print progress while waiting
quiet = false
"#
    }
}
