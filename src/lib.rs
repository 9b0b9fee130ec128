//! Resilient package metadata resolution
//!
//! - [`version`]: version range parsing and candidate selection
//! - [`license`]: license expression identifier extraction
//! - [`flight`]: single-flight request coalescing
//! - [`http`]: transport middlewares (rate limiting, persistent caching)
//! - [`metadata`]: tiered metadata resolution for NuGet packages
//! - [`config`]: configuration and data directories
//! - [`logging`]: tracing setup

pub mod config;
pub mod flight;
pub mod http;
pub mod license;
pub mod logging;
pub mod metadata;
pub mod version;
