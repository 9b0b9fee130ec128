//! Outbound HTTP layer
//!
//! Requests go through a chain of [`Transport`] middlewares before reaching the
//! network:
//!
//! ```text
//! ┌──────────────────────┐    ┌───────────────────┐    ┌──────────────────┐
//! │PersistentResponseCache│──▶│ DomainRateLimiter │───▶│ ReqwestTransport │
//! │ (hits skip the rest) │    │ (per-host bucket) │    │    (network)     │
//! └──────────────────────┘    └───────────────────┘    └──────────────────┘
//! ```
//!
//! Package archives skip the response cache and enter at the rate limiter.
//!
//! # Modules
//!
//! - [`transport`]: `Transport` trait and the reqwest implementation
//! - [`rate_limit`]: Per-domain token bucket middleware
//! - [`response_cache`]: Persistent response cache middleware
//! - [`host_pattern`]: Host patterns with most-specific-wins matching
//! - [`types`]: Request and response values
//! - [`error`]: Transport errors

pub mod error;
pub mod host_pattern;
pub mod rate_limit;
pub mod response_cache;
pub mod transport;
pub mod types;

use std::io;
use std::sync::Arc;
use std::time::Duration;

pub use error::HttpError;
pub use host_pattern::{HostPattern, MatchRank, best_match};
pub use rate_limit::{DomainRateLimiter, RateLimitRules};
pub use response_cache::PersistentResponseCache;
pub use transport::{ReqwestTransport, Transport};
pub use types::{HttpRequest, HttpResponse};

use crate::config::{REQUEST_TIMEOUT_MS, ResolverConfig, USER_AGENT};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Failed to create HTTP client: {0}")]
    Client(#[from] HttpError),

    #[error("Failed to open response cache: {0}")]
    Cache(#[from] io::Error),
}

/// Transports shared by the metadata tiers
pub struct Clients {
    /// Response cache, then rate limiter, then network
    pub cached: Arc<dyn Transport>,
    /// Rate limiter, then network
    ///
    /// For large bodies that are persisted in their own form, such as package
    /// archives.
    pub uncached: Arc<dyn Transport>,
}

/// Build the standard chains over one rate limiter and one network client
pub fn build_clients(config: &ResolverConfig) -> Result<Clients, ClientError> {
    let network: Arc<dyn Transport> = Arc::new(ReqwestTransport::new(
        USER_AGENT,
        Duration::from_millis(REQUEST_TIMEOUT_MS),
    )?);
    let limited: Arc<dyn Transport> = Arc::new(DomainRateLimiter::new(
        RateLimitRules::from(&config.rate_limits),
        network,
    ));
    let cached = PersistentResponseCache::open(
        &config.cache.response_cache_dir(),
        Arc::clone(&limited),
    )?;
    Ok(Clients {
        cached: Arc::new(cached),
        uncached: limited,
    })
}
