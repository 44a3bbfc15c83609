//! Config loading and persistence.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Result;

#[derive(Debug, Error)]
#[error("config error: {reason}")]
pub struct ConfigError {
    pub reason: String,
}

fn config_error(reason: String) -> crate::Error {
    crate::Error::Config(ConfigError { reason })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Debounce window for value edits, in milliseconds.
    pub debounce_ms: u64,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debounce_ms: 400,
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 0 = errors only, 1 = info, 2+ = debug. `PRODSYNC_LOG` overrides.
    pub verbosity: u8,
    pub stdout: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            verbosity: 1,
            stdout: true,
        }
    }
}

pub fn load(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .map_err(|e| config_error(format!("cannot read {}: {e}", path.display())))?;
    toml::from_str(&contents)
        .map_err(|e| config_error(format!("cannot parse {}: {e}", path.display())))
}

/// Load the config, falling back to defaults (and writing them out) when
/// the file is missing or unreadable. Never fails: a bad config is worth
/// a warning, not a refused session.
pub fn load_or_init(path: &Path) -> Config {
    if !path.exists() {
        let cfg = Config::default();
        if let Err(e) = write_config(path, &cfg) {
            tracing::warn!("cannot write default config: {e}");
        }
        return cfg;
    }
    match load(path) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!("config load failed, using defaults: {e}");
            Config::default()
        }
    }
}

/// Render and atomically replace the config file. The write goes through
/// a temp file in the same directory so a crash never leaves a torn file.
pub fn write_config(path: &Path, cfg: &Config) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| config_error(format!("{} has no parent directory", path.display())))?;
    fs::create_dir_all(dir)
        .map_err(|e| config_error(format!("cannot create {}: {e}", dir.display())))?;
    let contents = toml::to_string_pretty(cfg)
        .map_err(|e| config_error(format!("cannot render config: {e}")))?;

    let mut temp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| config_error(format!("cannot create temp file in {}: {e}", dir.display())))?;
    temp.write_all(contents.as_bytes())
        .map_err(|e| config_error(format!("cannot write config temp file: {e}")))?;
    temp.persist(path)
        .map_err(|e| config_error(format!("cannot replace {}: {e}", path.display())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        let cfg = Config {
            debounce_ms: 250,
            logging: LoggingConfig {
                verbosity: 2,
                stdout: false,
            },
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load(&path).expect("load");
        assert_eq!(loaded.debounce_ms, 250);
        assert_eq!(loaded.debounce(), Duration::from_millis(250));
        assert_eq!(loaded.logging.verbosity, 2);
        assert!(!loaded.logging.stdout);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "debounce_ms = 100\n").expect("write");
        let loaded = load(&path).expect("load");
        assert_eq!(loaded.debounce_ms, 100);
        assert_eq!(loaded.logging.verbosity, 1);
    }

    #[test]
    fn load_or_init_writes_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        let cfg = load_or_init(&path);
        assert_eq!(cfg.debounce_ms, 400);
        assert!(path.exists());
        let loaded = load(&path).expect("load");
        assert_eq!(loaded.debounce_ms, 400);
    }

    #[test]
    fn unreadable_config_falls_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "debounce_ms = \"soon\"").expect("write");
        let cfg = load_or_init(&path);
        assert_eq!(cfg.debounce_ms, 400);
    }
}
