use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::backend;
use crate::composer::ComposerOptions;
use crate::media::{self, CompressOptions};
use crate::model::{Identity, DEFAULT_DISPLAY_NAME};

const DEFAULT_ENV_PREFIX: &str = "WALL";
pub const DEFAULT_BUCKET: &str = "post-images";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendConfig {
    /// Project URL. Empty selects the in-memory wall.
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            user_agent: default_user_agent(),
            timeout: default_timeout(),
        }
    }
}

fn default_user_agent() -> String {
    format!("wall-tui/{}", crate::VERSION)
}

fn default_timeout() -> Duration {
    Duration::from_secs(20)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    #[serde(default = "default_bucket")]
    pub bucket: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: default_bucket(),
        }
    }
}

fn default_bucket() -> String {
    DEFAULT_BUCKET.into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IdentityConfig {
    #[serde(default = "default_display_name")]
    pub display_name: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            display_name: default_display_name(),
        }
    }
}

fn default_display_name() -> String {
    DEFAULT_DISPLAY_NAME.into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaConfig {
    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,
    #[serde(default = "default_soft_limit_bytes")]
    pub soft_limit_bytes: u64,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            max_dimension: default_max_dimension(),
            soft_limit_bytes: default_soft_limit_bytes(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

fn default_max_dimension() -> u32 {
    media::DEFAULT_MAX_DIMENSION
}

fn default_soft_limit_bytes() -> u64 {
    media::DEFAULT_SOFT_LIMIT_BYTES
}

fn default_jpeg_quality() -> u8 {
    media::DEFAULT_JPEG_QUALITY
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

impl Config {
    pub fn identity(&self) -> Identity {
        Identity::new(self.identity.display_name.clone())
    }

    pub fn compress_options(&self) -> CompressOptions {
        CompressOptions {
            max_dimension: self.media.max_dimension,
            soft_limit_bytes: self.media.soft_limit_bytes,
            jpeg_quality: self.media.jpeg_quality,
        }
    }

    pub fn composer_options(&self) -> ComposerOptions {
        ComposerOptions {
            bucket: self.storage.bucket.clone(),
            compress: self.compress_options(),
        }
    }

    pub fn uses_backend(&self) -> bool {
        !self.backend.url.trim().is_empty()
    }

    pub fn backend_client_config(&self) -> backend::ClientConfig {
        backend::ClientConfig {
            base_url: self.backend.url.clone(),
            api_key: self.backend.api_key.clone(),
            user_agent: self.backend.user_agent.clone(),
            timeout: Some(self.backend.timeout),
            http_client: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        if path.exists() {
            let from_file = read_config_file(path)?;
            cfg = merge_config(cfg, from_file);
        }
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            let from_file = read_config_file(&default_path)?;
            cfg = merge_config(cfg, from_file);
        }
    }

    // Env values were set on purpose, so they apply even when they equal a default.
    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    for (key, value) in load_env(prefix) {
        apply_env_value(&mut cfg, &key, value);
    }

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn merge_config(mut base: Config, other: Config) -> Config {
    let defaults = Config::default();

    if !other.backend.url.is_empty() {
        base.backend.url = other.backend.url;
    }
    if !other.backend.api_key.is_empty() {
        base.backend.api_key = other.backend.api_key;
    }
    if !other.backend.user_agent.is_empty() && other.backend.user_agent != defaults.backend.user_agent
    {
        base.backend.user_agent = other.backend.user_agent;
    }
    if other.backend.timeout != defaults.backend.timeout && !other.backend.timeout.is_zero() {
        base.backend.timeout = other.backend.timeout;
    }

    if !other.storage.bucket.is_empty() && other.storage.bucket != defaults.storage.bucket {
        base.storage.bucket = other.storage.bucket;
    }

    if !other.identity.display_name.trim().is_empty()
        && other.identity.display_name != defaults.identity.display_name
    {
        base.identity.display_name = other.identity.display_name;
    }

    if other.media.max_dimension != 0 && other.media.max_dimension != defaults.media.max_dimension {
        base.media.max_dimension = other.media.max_dimension;
    }
    if other.media.soft_limit_bytes != 0
        && other.media.soft_limit_bytes != defaults.media.soft_limit_bytes
    {
        base.media.soft_limit_bytes = other.media.soft_limit_bytes;
    }
    if other.media.jpeg_quality != 0 && other.media.jpeg_quality != defaults.media.jpeg_quality {
        base.media.jpeg_quality = other.media.jpeg_quality.min(100);
    }

    if !other.logging.level.is_empty() && other.logging.level != defaults.logging.level {
        base.logging.level = other.logging.level;
    }
    if other.logging.file.is_some() {
        base.logging.file = other.logging.file;
    }

    base
}

/// Only the keys actually present under `prefix`, as `section.key`.
fn load_env(prefix: &str) -> HashMap<String, String> {
    let upper_prefix = format!("{}_", prefix.to_uppercase());
    env::vars()
        .filter_map(|(key, value)| {
            let stripped = key.strip_prefix(&upper_prefix)?;
            Some((stripped.to_ascii_lowercase().replace("__", "."), value))
        })
        .collect()
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "backend.url" => cfg.backend.url = value,
        "backend.api_key" => cfg.backend.api_key = value,
        "backend.user_agent" => cfg.backend.user_agent = value,
        "backend.timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.backend.timeout = duration;
            }
        }
        "storage.bucket" => cfg.storage.bucket = value,
        "identity.display_name" => cfg.identity.display_name = value,
        "media.max_dimension" => {
            if let Ok(parsed) = value.parse::<u32>() {
                cfg.media.max_dimension = parsed;
            }
        }
        "media.soft_limit_bytes" => {
            if let Ok(parsed) = value.parse::<u64>() {
                cfg.media.soft_limit_bytes = parsed;
            }
        }
        "media.jpeg_quality" => {
            if let Ok(parsed) = value.parse::<u8>() {
                cfg.media.jpeg_quality = parsed.min(100);
            }
        }
        "logging.level" => cfg.logging.level = value,
        "logging.file" => cfg.logging.file = Some(PathBuf::from(value)),
        _ => {}
    }
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("wall-tui").join("config.yaml"))
}

/// Stores the backend connection in the config file, keeping any other
/// settings already there.
pub fn save_backend(path: Option<PathBuf>, url: &str, api_key: &str) -> Result<PathBuf> {
    let url = url.trim();
    let api_key = api_key.trim();

    anyhow::ensure!(!url.is_empty(), "config: backend.url is required");
    url::Url::parse(url).with_context(|| format!("config: backend.url {url:?} is not a URL"))?;

    let path = if let Some(path) = path {
        path
    } else {
        default_config_path().context("config: unable to determine default config path")?
    };

    let mut cfg = if path.exists() {
        read_config_file(&path)?
    } else {
        Config::default()
    };

    cfg.backend.url = url.to_string();
    cfg.backend.api_key = api_key.to_string();

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("config: failed to create directory {}", parent.display()))?;
    }

    let contents = serde_yaml::to_string(&cfg).context("config: failed to serialize config")?;
    fs::write(&path, contents)
        .with_context(|| format!("config: failed to write file {}", path.display()))?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn isolated(path: PathBuf, prefix: &str) -> LoadOptions {
        LoadOptions {
            config_file: Some(path),
            env_prefix: Some(prefix.to_string()),
        }
    }

    #[test]
    fn load_defaults_without_files() {
        let dir = tempdir().unwrap();
        let cfg = load(isolated(dir.path().join("missing.yaml"), "WALL_TEST_DEFAULTS")).unwrap();
        assert_eq!(cfg.storage.bucket, DEFAULT_BUCKET);
        assert_eq!(cfg.identity().display_name(), DEFAULT_DISPLAY_NAME);
        assert_eq!(cfg.media.max_dimension, 1920);
        assert!(!cfg.uses_backend());
    }

    #[test]
    fn file_values_survive_empty_env() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "backend:\n  url: https://wall.example.co\n  timeout: 5s\nidentity:\n  display_name: Ada Lovelace\n",
        )
        .unwrap();
        let cfg = load(isolated(path, "WALL_TEST_FILE")).unwrap();
        assert_eq!(cfg.backend.url, "https://wall.example.co");
        assert_eq!(cfg.backend.timeout, Duration::from_secs(5));
        assert_eq!(cfg.identity().display_name(), "Ada Lovelace");
        assert!(cfg.uses_backend());
    }

    #[test]
    fn save_backend_creates_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");
        save_backend(Some(path.clone()), "https://wall.example.co", "anon-key").unwrap();
        let saved = read_config_file(&path).unwrap();
        assert_eq!(saved.backend.url, "https://wall.example.co");
        assert_eq!(saved.backend.api_key, "anon-key");
    }

    #[test]
    fn save_backend_rejects_bad_url() {
        let dir = tempdir().unwrap();
        assert!(save_backend(Some(dir.path().join("c.yaml")), "not a url", "").is_err());
    }

    #[test]
    fn env_overrides() {
        env::set_var("WALL_TEST_ENV_STORAGE__BUCKET", "photos");
        env::set_var("WALL_TEST_ENV_MEDIA__MAX_DIMENSION", "1024");
        let dir = tempdir().unwrap();
        let cfg = load(isolated(dir.path().join("none.yaml"), "WALL_TEST_ENV")).unwrap();
        assert_eq!(cfg.storage.bucket, "photos");
        assert_eq!(cfg.compress_options().max_dimension, 1024);
        env::remove_var("WALL_TEST_ENV_STORAGE__BUCKET");
        env::remove_var("WALL_TEST_ENV_MEDIA__MAX_DIMENSION");
    }

    #[test]
    fn env_value_equal_to_default_still_overrides_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "identity:\n  display_name: Ada Lovelace\nmedia:\n  max_dimension: 1024\n",
        )
        .unwrap();
        env::set_var("WALL_TEST_RESET_IDENTITY__DISPLAY_NAME", DEFAULT_DISPLAY_NAME);
        env::set_var("WALL_TEST_RESET_MEDIA__MAX_DIMENSION", "1920");
        let cfg = load(isolated(path, "WALL_TEST_RESET")).unwrap();
        env::remove_var("WALL_TEST_RESET_IDENTITY__DISPLAY_NAME");
        env::remove_var("WALL_TEST_RESET_MEDIA__MAX_DIMENSION");

        assert_eq!(cfg.identity().display_name(), DEFAULT_DISPLAY_NAME);
        assert_eq!(cfg.media.max_dimension, 1920);
    }

    #[test]
    fn unknown_env_keys_are_ignored() {
        env::set_var("WALL_TEST_UNKNOWN_UI__THEME", "dracula");
        let dir = tempdir().unwrap();
        let cfg = load(isolated(dir.path().join("none.yaml"), "WALL_TEST_UNKNOWN")).unwrap();
        env::remove_var("WALL_TEST_UNKNOWN_UI__THEME");
        assert_eq!(cfg, Config::default());
    }
}
