//! Detection of `vmview.toml`.
//!
//! Search order:
//! 1. The file given with `--config`
//! 2. Current working directory upward
//! 3. Upward from the binary location
//! 4. Defaults

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use vmview::Config;

pub const CONFIG_FILE: &str = "vmview.toml";

pub struct LoadedConfig {
    pub config: Config,
    pub source: ConfigSource,
}

pub enum ConfigSource {
    File(PathBuf),
    /// No config file found
    Default,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::File(path) => write!(f, "{}", path.display()),
            ConfigSource::Default => f.write_str("defaults"),
        }
    }
}

fn find_config(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        let candidate = current.join(CONFIG_FILE);
        if candidate.exists() {
            return Some(candidate);
        }
        if !current.pop() {
            return None;
        }
    }
}

pub fn read_config(path: &Path) -> Result<Config> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Invalid config in {}", path.display()))
}

pub fn detect_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    let found = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => std::env::current_dir()
            .ok()
            .and_then(|cwd| find_config(&cwd))
            .or_else(|| {
                let exe = std::env::current_exe().ok()?;
                exe.parent().and_then(find_config)
            }),
    };

    match found {
        Some(path) => Ok(LoadedConfig {
            config: read_config(&path)?,
            source: ConfigSource::File(path),
        }),
        None => Ok(LoadedConfig {
            config: Config::default(),
            source: ConfigSource::Default,
        }),
    }
}
