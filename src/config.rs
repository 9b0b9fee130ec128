use std::path::{Path, PathBuf};
use std::time::Duration;

use indexmap::IndexMap;
use serde::Deserialize;
use thiserror::Error;

// =============================================================================
// Endpoint and transport constants
// =============================================================================

/// Public registry hosting the package pages
pub const DEFAULT_REGISTRY_URL: &str = "https://www.nuget.org";

/// Flat container serving package archives
pub const DEFAULT_PACKAGE_CONTENT_URL: &str = "https://api.nuget.org/v3-flatcontainer";

pub const USER_AGENT: &str = concat!("package-meta/", env!("CARGO_PKG_VERSION"));

/// Timeout for a single HTTP request in milliseconds (30 seconds)
pub const REQUEST_TIMEOUT_MS: u64 = 30_000;

const APP_DIR_NAME: &str = "package-meta";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Resolver configuration structure
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ResolverConfig {
    pub cache: CacheConfig,
    pub registry: RegistryConfig,
    pub custom_api: Option<CustomApiConfig>,
    pub rate_limits: RateLimitsConfig,
}

impl ResolverConfig {
    /// Load configuration from a JSON file, defaulting missing fields
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Cache-related configuration
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
    /// Directory holding persisted HTTP responses
    pub response_cache_dir: Option<PathBuf>,
    /// Directory holding downloaded package manifests
    pub packages_dir: Option<PathBuf>,
}

impl CacheConfig {
    pub fn response_cache_dir(&self) -> PathBuf {
        self.response_cache_dir
            .clone()
            .unwrap_or_else(|| data_dir().join("responses"))
    }

    pub fn packages_dir(&self) -> PathBuf {
        self.packages_dir
            .clone()
            .unwrap_or_else(|| data_dir().join("packages"))
    }
}

/// Public registry endpoints
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct RegistryConfig {
    pub base_url: String,
    pub package_content_url: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_REGISTRY_URL.to_string(),
            package_content_url: DEFAULT_PACKAGE_CONTENT_URL.to_string(),
        }
    }
}

/// Optional private metadata API
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CustomApiConfig {
    pub base_url: String,
}

/// Admission limits for one host or host pattern
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct RateLimitConfig {
    /// Permits granted per replenishment period
    pub permit_limit: u32,
    pub replenishment_period_ms: u64,
    /// Requests allowed to wait for a permit before new ones are rejected
    pub queue_limit: usize,
}

impl RateLimitConfig {
    pub fn new(permit_limit: u32, replenishment_period: Duration, queue_limit: usize) -> Self {
        Self {
            permit_limit,
            replenishment_period_ms: replenishment_period.as_millis() as u64,
            queue_limit,
        }
    }

    /// Permits per period, never zero
    pub fn permits(&self) -> u32 {
        self.permit_limit.max(1)
    }

    /// Replenishment period, never shorter than one millisecond
    pub fn replenishment_period(&self) -> Duration {
        Duration::from_millis(self.replenishment_period_ms.max(1))
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            permit_limit: 10,
            replenishment_period_ms: 1_000,
            queue_limit: 100,
        }
    }
}

/// Per-host rate limits, keyed by host pattern (`api.example.com`, `*.example.com`)
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct RateLimitsConfig {
    pub default: RateLimitConfig,
    pub hosts: IndexMap<String, RateLimitConfig>,
}

impl Default for RateLimitsConfig {
    fn default() -> Self {
        Self {
            default: RateLimitConfig::default(),
            hosts: IndexMap::from([(
                "*.nuget.org".to_string(),
                RateLimitConfig {
                    permit_limit: 5,
                    replenishment_period_ms: 1_000,
                    queue_limit: 200,
                },
            )]),
        }
    }
}

/// Returns the path to the data directory for package-meta.
/// Uses $XDG_DATA_HOME/package-meta if XDG_DATA_HOME is set,
/// otherwise falls back to ~/.local/share/package-meta,
/// or ./package-meta if neither is available.
pub fn data_dir() -> PathBuf {
    data_dir_with_env(std::env::var("XDG_DATA_HOME").ok(), dirs::home_dir())
}

/// Returns the path to the log file.
pub fn log_path() -> PathBuf {
    data_dir().join("package-meta.log")
}

fn data_dir_with_env(xdg_data_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    let data_dir = xdg_data_home
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));

    data_dir.join(APP_DIR_NAME)
}
