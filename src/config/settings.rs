//! Application settings and configuration management

use crate::backend::traits::BackendKind;
use crate::error::{AppError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Conventional environment variables honoured on top of the prefixed ones
const CONVENTIONAL_ENV: &[(&str, &str)] = &[
    ("PORT", "server.port"),
    ("PRODUCTION", "storage.production"),
    ("REPLICATE_API_TOKEN", "backends.stablediffusion.api_token"),
    ("MIDJOURNEY_API_SECRET", "backends.midjourney.api_secret"),
    ("UNSPLASH_ACCESS_KEY", "backends.unsplash.access_key"),
];

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub backends: BackendsConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5683
}

/// Image cache location
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
    /// Use `production_dir` instead of `cache_dir`
    #[serde(default)]
    pub production: bool,
    #[serde(default = "default_production_dir")]
    pub production_dir: String,
}

fn default_cache_dir() -> String {
    "./images".to_string()
}

fn default_production_dir() -> String {
    "/var/lib/prompt-gateway/images".to_string()
}

impl StorageConfig {
    /// Directory actually used for cached images
    pub fn effective_dir(&self) -> PathBuf {
        if self.production {
            PathBuf::from(&self.production_dir)
        } else {
            PathBuf::from(&self.cache_dir)
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// Which backend serves the bare `/{prompt}` route
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RoutingConfig {
    #[serde(default = "default_backend_kind")]
    pub default_backend: BackendKind,
}

fn default_backend_kind() -> BackendKind {
    BackendKind::StableDiffusion
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            default_backend: default_backend_kind(),
        }
    }
}

/// Single-flight coordination limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrchestratorConfig {
    /// Longest a request waits on a generation started by another request
    #[serde(default = "default_follower_wait")]
    pub follower_wait_secs: u64,
}

fn default_follower_wait() -> u64 {
    600
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            follower_wait_secs: default_follower_wait(),
        }
    }
}

impl OrchestratorConfig {
    pub fn follower_wait(&self) -> Duration {
        Duration::from_secs(self.follower_wait_secs)
    }
}

/// Polling budget for asynchronous generation jobs
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PollConfig {
    #[serde(default = "default_poll_interval")]
    pub interval_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_poll_timeout")]
    pub timeout_secs: u64,
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_max_attempts() -> u32 {
    300
}

fn default_poll_timeout() -> u64 {
    300
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval(),
            max_attempts: default_max_attempts(),
            timeout_secs: default_poll_timeout(),
        }
    }
}

/// Per-backend configuration; a missing section leaves the backend unregistered
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BackendsConfig {
    #[serde(default)]
    pub stablediffusion: Option<ReplicateConfig>,
    #[serde(default)]
    pub midjourney: Option<MidjourneyConfig>,
    #[serde(default)]
    pub unsplash: Option<UnsplashConfig>,
}

/// Replicate predictions API
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReplicateConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub api_token: String,
    #[serde(default = "default_replicate_url")]
    pub base_url: String,
    #[serde(default = "default_replicate_version")]
    pub model_version: String,
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub max_concurrent: Option<usize>,
}

fn default_replicate_url() -> String {
    "https://api.replicate.com".to_string()
}

fn default_replicate_version() -> String {
    "db21e45d3f7023abc2a46ee38a23973f6dce16bb082a930b0c49861f96d1e5bf".to_string()
}

/// Midjourney task proxy session
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MidjourneyConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_midjourney_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_secret: String,
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
    #[serde(default = "default_midjourney_concurrency")]
    pub max_concurrent: usize,
    /// Grid image (1-4) picked for the upscale step
    #[serde(default = "default_upscale_index")]
    pub upscale_index: u8,
}

fn default_midjourney_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_midjourney_concurrency() -> usize {
    2
}

fn default_upscale_index() -> u8 {
    1
}

/// Unsplash search API
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UnsplashConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub access_key: String,
    #[serde(default = "default_unsplash_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
}

fn default_unsplash_url() -> String {
    "https://api.unsplash.com".to_string()
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> u64 {
    60000
}

impl Settings {
    /// Load settings from configuration files and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/default.toml")
    }

    /// Load settings from a specific configuration file path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut builder = Config::builder()
            // Start with default values
            .set_default("server.host", default_host())?
            .set_default("server.port", i64::from(default_port()))?
            .set_default("storage.cache_dir", default_cache_dir())?
            .set_default("storage.production", false)?
            .set_default("storage.production_dir", default_production_dir())?
            .set_default("logging.level", default_log_level())?
            .set_default("logging.format", default_log_format())?
            // Load from configuration file
            .add_source(File::with_name(path.as_ref().to_str().unwrap_or("config/default")).required(false))
            // Override with environment variables (PROMPT_GATEWAY__SECTION__KEY)
            .add_source(
                Environment::with_prefix("PROMPT_GATEWAY")
                    .separator("__")
                    .try_parsing(true),
            );

        for (var, key) in CONVENTIONAL_ENV {
            builder = builder.set_override_option(*key, std::env::var(var).ok())?;
        }

        let settings: Settings = builder.build()?.try_deserialize()?;
        Ok(settings)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(AppError::Config("Server port cannot be 0".to_string()));
        }

        if self.poll.max_attempts == 0 || self.poll.timeout_secs == 0 {
            return Err(AppError::Config(
                "Polling needs at least one attempt and a non-zero timeout".to_string(),
            ));
        }

        if let Some(sd) = self.backends.stablediffusion.as_ref().filter(|c| c.enabled) {
            if sd.api_token.is_empty() {
                return Err(AppError::Config(
                    "Backend 'stablediffusion' requires an api_token".to_string(),
                ));
            }
            if sd.max_concurrent == Some(0) {
                return Err(AppError::Config(
                    "Backend 'stablediffusion' max_concurrent cannot be 0".to_string(),
                ));
            }
        }

        if let Some(mj) = self.backends.midjourney.as_ref().filter(|c| c.enabled) {
            if mj.max_concurrent == 0 {
                return Err(AppError::Config(
                    "Backend 'midjourney' max_concurrent cannot be 0".to_string(),
                ));
            }
            if !(1..=4).contains(&mj.upscale_index) {
                return Err(AppError::Config(format!(
                    "Backend 'midjourney' upscale_index must be 1-4, got {}",
                    mj.upscale_index
                )));
            }
        }

        if let Some(us) = self.backends.unsplash.as_ref().filter(|c| c.enabled) {
            if us.access_key.is_empty() {
                return Err(AppError::Config(
                    "Backend 'unsplash' requires an access_key".to_string(),
                ));
            }
        }

        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
            },
            storage: StorageConfig {
                cache_dir: default_cache_dir(),
                production: false,
                production_dir: default_production_dir(),
            },
            logging: LoggingConfig {
                level: default_log_level(),
                format: default_log_format(),
            },
            routing: RoutingConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            poll: PollConfig::default(),
            backends: BackendsConfig::default(),
        }
    }
}
