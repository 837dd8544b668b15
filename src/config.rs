// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::cache::QueryOptions;
use crate::error::Error;

/// Environment variable holding the CMS origin, e.g. `https://cms.example.com`.
pub const API_URL_ENV: &str = "API_URL";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub cache: CacheConfig,
    pub ui: UiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub request_timeout_secs: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub stale_time_ms: u64,
    pub gc_time_ms: u64,
    pub retry: u32,
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub description_length: usize,
    pub search_limit: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            user_agent: concat!("showreel/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stale_time_ms: 5 * 60 * 1000,
            gc_time_ms: 5 * 60 * 1000,
            retry: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            description_length: 80,
            search_limit: 50,
        }
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl CacheConfig {
    pub fn query_options(&self) -> QueryOptions {
        QueryOptions {
            stale_time: Duration::from_millis(self.stale_time_ms),
            gc_time: Duration::from_millis(self.gc_time_ms),
            retry: self.retry,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Config =
            toml::from_str(&content).with_context(|| "Failed to parse TOML configuration")?;

        Ok(config)
    }

    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Config {
        if !path.as_ref().exists() {
            return Self::default();
        }
        Self::load(&path).unwrap_or_else(|e| {
            tracing::warn!("Could not load config file, using defaults: {:#}", e);
            Self::default()
        })
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content =
            toml::to_string_pretty(self).with_context(|| "Failed to serialize config to TOML")?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(&path, content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|p| p.join("showreel").join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    /// Reads the CMS origin from `API_URL` and returns the API base (`{origin}/api`).
    pub fn api_base_url() -> crate::Result<Url> {
        parse_api_base(std::env::var(API_URL_ENV).ok().as_deref())
    }
}

pub fn parse_api_base(value: Option<&str>) -> crate::Result<Url> {
    let raw = value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::Configuration(format!("{} is not set", API_URL_ENV)))?;

    let origin = Url::parse(raw)
        .map_err(|e| Error::Configuration(format!("Invalid {} '{}': {}", API_URL_ENV, raw, e)))?;

    if origin.cannot_be_a_base() || !matches!(origin.scheme(), "http" | "https") {
        return Err(Error::Configuration(format!(
            "{} must be an http(s) URL, got '{}'",
            API_URL_ENV, raw
        )));
    }

    let base = format!("{}/api", origin.as_str().trim_end_matches('/'));
    Url::parse(&base).map_err(|e| Error::Configuration(format!("Invalid API base '{}': {}", base, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn api_base_appends_api_segment() {
        let url = parse_api_base(Some("https://cms.example.com/")).unwrap();
        assert_eq!(url.as_str(), "https://cms.example.com/api");

        let url = parse_api_base(Some("http://localhost:1337")).unwrap();
        assert_eq!(url.as_str(), "http://localhost:1337/api");
    }

    #[test]
    fn missing_api_url_is_configuration_failure() {
        let err = parse_api_base(None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let err = parse_api_base(Some("   ")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn rejects_non_http_origin() {
        let err = parse_api_base(Some("ftp://cms.example.com")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let err = parse_api_base(Some("not a url")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config: Config = toml::from_str("[cache]\nstale_time_ms = 1000\n").unwrap();
        assert_eq!(config.cache.stale_time_ms, 1000);
        assert_eq!(config.cache.retry, 3);
        assert_eq!(config.ui.description_length, 80);

        let options = config.cache.query_options();
        assert_eq!(options.stale_time, Duration::from_secs(1));
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.ui.search_limit = 7;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.ui.search_limit, 7);
        assert_eq!(loaded.api.request_timeout_secs, 30);
    }

    #[test]
    fn load_or_default_falls_back_on_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "this is = = not toml").unwrap();

        let config = Config::load_or_default(&path);
        assert_eq!(config.cache.stale_time_ms, 5 * 60 * 1000);
    }
}
