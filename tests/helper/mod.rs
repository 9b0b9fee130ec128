//! Shared test utilities
#![allow(dead_code)]

pub mod package;
pub mod transport;

pub use package::{nupkg, nuspec, registry_page};
pub use transport::RecordingTransport;

use tempfile::TempDir;

use package_meta::config::{CacheConfig, CustomApiConfig, RegistryConfig, ResolverConfig};

/// Configuration pointing every tier at one mock server, caching under `dir`
pub fn test_config(server_url: &str, dir: &TempDir, with_custom_api: bool) -> ResolverConfig {
    ResolverConfig {
        cache: CacheConfig {
            response_cache_dir: Some(dir.path().join("responses")),
            packages_dir: Some(dir.path().join("packages")),
        },
        registry: RegistryConfig {
            base_url: server_url.to_string(),
            package_content_url: format!("{}/flat", server_url),
        },
        custom_api: with_custom_api.then(|| CustomApiConfig {
            base_url: format!("{}/api", server_url),
        }),
        ..ResolverConfig::default()
    }
}
