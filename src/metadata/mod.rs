//! Package metadata resolution
//!
//! Resolves a fixed set of properties for a package id and version by falling
//! back through three tiers, each implementing [`MetadataSource`]:
//!
//! 1. [`local`]: the package's `.nuspec`, downloaded and unpacked on demand
//! 2. [`registry`]: the public registry's package page
//! 3. [`custom_api`]: an optional private JSON API
//!
//! Network tiers share one middleware chain (response cache, then per-domain
//! rate limiter). [`resolver::MetadataResolver`] drives the fallback.

pub mod custom_api;
pub mod error;
pub mod local;
pub mod nuspec;
pub mod property;
pub mod registry;
pub mod resolver;
pub mod source;

pub use error::{DownloadError, MetadataError};
pub use property::{MetadataProperty, PackageMetadata, PropertyValue};
pub use resolver::MetadataResolver;
pub use source::{MetadataSource, PackageRequest, RawMetadata, SourceKind};
