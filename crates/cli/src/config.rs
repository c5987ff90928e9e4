//! Database path resolution.
//!
//! Precedence: `--db` flag, then `NANOSENSE_DB_PATH`, then the
//! `database_path` key of `~/.nanosense/config.json`, then
//! `~/.nanosense/nanosense_data.db`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use nanosense_core::constants::{APP_DIR_NAME, CONFIG_FILE, DEFAULT_DB_FILE, ENV_DB_PATH};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    database_path: Option<String>,
}

fn app_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(APP_DIR_NAME)
}

pub(crate) fn resolve_db_path(flag: Option<PathBuf>) -> Result<PathBuf> {
    let env = std::env::var(ENV_DB_PATH).ok();
    resolve_with(flag, env.as_deref(), &app_dir())
}

fn resolve_with(flag: Option<PathBuf>, env: Option<&str>, app_dir: &Path) -> Result<PathBuf> {
    if let Some(path) = flag {
        return Ok(expand_home(&path.to_string_lossy()));
    }
    if let Some(raw) = env.map(str::trim).filter(|s| !s.is_empty()) {
        return Ok(expand_home(raw));
    }
    let config = read_config(&app_dir.join(CONFIG_FILE))?;
    if let Some(raw) = config.database_path.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        return Ok(expand_home(raw));
    }
    Ok(app_dir.join(DEFAULT_DB_FILE))
}

fn read_config(path: &Path) -> Result<FileConfig> {
    if !path.is_file() {
        return Ok(FileConfig::default());
    }
    let text = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid config file {}", path.display()))
}

fn expand_home(raw: &str) -> PathBuf {
    match raw.strip_prefix("~/") {
        Some(rest) => dirs::home_dir().map_or_else(|| PathBuf::from(raw), |home| home.join(rest)),
        None => PathBuf::from(raw),
    }
}
