//! Process configuration: persisted defaults plus the `API_BASE_URL`
//! environment override. A missing or corrupt config file never blocks
//! startup; it just falls back to defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub sensor_port: u16,
    pub frames_dir: PathBuf,
    pub debug_dir: PathBuf,
    pub batch_size: usize,
    pub capture_interval_ms: u64,
    pub settle_delay_ms: u64,
    pub verdict_cache_ttl_ms: u64,
    pub detection_enabled: bool,
    pub classifier_poll_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_base_url: "http://127.0.0.1:8000".to_string(),
            sensor_port: 8765,
            frames_dir: PathBuf::from("screenshots"),
            debug_dir: config_dir().join("debug"),
            batch_size: 4,
            capture_interval_ms: 1_000,
            settle_delay_ms: 500,
            verdict_cache_ttl_ms: 5_000,
            detection_enabled: true,
            classifier_poll_interval_ms: 3_000,
        }
    }
}

/// The OS config directory for this app, created on first access.
pub fn config_dir() -> PathBuf {
    let dir = dirs::config_dir()
        .unwrap_or_default()
        .join("post-lens");
    let _ = std::fs::create_dir_all(&dir);
    dir
}

fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Loads config from disk, falling back to defaults on any read/parse
/// failure, then applies the `API_BASE_URL` environment override.
pub fn load_config() -> Config {
    let path = config_path();

    let mut config = if !path.exists() {
        Config::default()
    } else {
        match std::fs::read_to_string(&path) {
            Ok(data) => serde_json::from_str(&data).unwrap_or_default(),
            Err(_) => Config::default(),
        }
    };

    if let Ok(url) = std::env::var("API_BASE_URL") {
        if !url.is_empty() {
            config.api_base_url = url;
        }
    }

    let _ = std::fs::create_dir_all(&config.frames_dir);
    let _ = std::fs::create_dir_all(&config.debug_dir);

    config
}

pub fn save_config(config: &Config) -> anyhow::Result<()> {
    let data = serde_json::to_string_pretty(config)?;
    std::fs::write(config_path(), data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_batch_size_matches_spec_decision() {
        assert_eq!(Config::default().batch_size, 4);
    }

    #[test]
    fn default_api_base_url_matches_spec() {
        assert_eq!(Config::default().api_base_url, "http://127.0.0.1:8000");
    }
}
