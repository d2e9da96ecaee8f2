use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::{geometry::DEFAULT_NEIGHBORS, platform};

/// Environment variable that replaces `api.base_url`.
pub const API_URL_ENV: &str = "STELLOS_API_URL";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub map: MapConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

/// Backend service the galaxy is read from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Seconds between track-listing polls.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapConfig {
    /// How many nearest neighbours each star is joined to.
    #[serde(default = "default_neighbors")]
    pub neighbors: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    #[serde(default = "default_preview_volume")]
    pub preview_volume: f32,
    #[serde(default = "default_playback_volume")]
    pub playback_volume: f32,
}

/// Loopback control API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            poll_interval_secs: default_poll_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            neighbors: default_neighbors(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            preview_volume: default_preview_volume(),
            playback_volume: default_playback_volume(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_http_enabled(),
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:7860".to_string()
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_neighbors() -> usize {
    DEFAULT_NEIGHBORS
}

fn default_preview_volume() -> f32 {
    0.6
}

fn default_playback_volume() -> f32 {
    0.8
}

fn default_http_enabled() -> bool {
    true
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8990
}

impl ApiConfig {
    /// Base URL without a trailing slash, ready for `format!("{}/tracks", ..)`.
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    /// Apply `STELLOS_API_URL` if it is set and non-empty.
    pub fn apply_env(&mut self) {
        self.apply_api_url(std::env::var(API_URL_ENV).ok());
    }

    /// Replace the backend URL when `url` carries a value.
    pub fn apply_api_url(&mut self, url: Option<String>) {
        if let Some(url) = url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty()) {
            self.api.base_url = url;
        }
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.api.base_url(), "http://localhost:7860");
        assert_eq!(config.api.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.map.neighbors, 2);
        assert!(config.http.enabled);
        assert_eq!(config.http.bind_address, "127.0.0.1");
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config = Config::from_toml_str(
            r#"
            [api]
            base_url = "https://galaxy.example.org/"

            [map]
            neighbors = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.api.base_url(), "https://galaxy.example.org");
        assert_eq!(config.api.poll_interval_secs, 5);
        assert_eq!(config.map.neighbors, 3);
        assert_eq!(config.http.port, 8990);
    }

    #[test]
    fn test_api_url_override() {
        let mut config = Config::default();
        config.apply_api_url(Some("   ".to_string()));
        assert_eq!(config.api.base_url(), "http://localhost:7860");
        config.apply_api_url(None);
        assert_eq!(config.api.base_url(), "http://localhost:7860");
        config.apply_api_url(Some("http://10.0.0.2:7860".to_string()));
        assert_eq!(config.api.base_url(), "http://10.0.0.2:7860");
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let mut config = Config::default();
        config.api.poll_interval_secs = 0;
        assert_eq!(config.api.poll_interval(), Duration::from_secs(1));
    }
}
