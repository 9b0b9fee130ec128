//! Metadata resolution across tiers
//!
//! ```text
//! property ──▶ local manifest ──▶ registry page ──▶ custom API
//!               (first tier with a non-blank value wins)
//! ```
//!
//! Each tier is fetched at most once per [`MetadataResolver::resolve`] call.
//! The license group (`LicensesNames`, `License`, `LicenseUrl`,
//! `LicenseContent`) is resolved together: the first tier whose license
//! expression yields identifiers supplies all four, so they never mix tiers.

use std::sync::Arc;

use indexmap::IndexMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::ResolverConfig;
use crate::http::{ClientError, build_clients};
use crate::license::extract_identifiers;
use crate::metadata::custom_api::CustomApiSource;
use crate::metadata::error::MetadataError;
use crate::metadata::local::{LocalManifestSource, PackageDownloader};
use crate::metadata::property::{MetadataProperty, PackageMetadata, PropertyValue};
use crate::metadata::registry::RegistryPageSource;
use crate::metadata::source::{MetadataSource, PackageRequest, RawMetadata};

type TierResult = Result<Option<Arc<RawMetadata>>, MetadataError>;

/// Lazily fetched tier results for one resolve call
struct Tiers<'a> {
    sources: &'a [Arc<dyn MetadataSource>],
    request: &'a PackageRequest,
    cancel: &'a CancellationToken,
    fetched: Vec<Option<TierResult>>,
}

impl<'a> Tiers<'a> {
    fn new(
        sources: &'a [Arc<dyn MetadataSource>],
        request: &'a PackageRequest,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            sources,
            request,
            cancel,
            fetched: vec![None; sources.len()],
        }
    }

    fn len(&self) -> usize {
        self.sources.len()
    }

    async fn get(&mut self, index: usize) -> TierResult {
        if let Some(result) = &self.fetched[index] {
            return result.clone();
        }

        let source = &self.sources[index];
        debug!("Fetching {} from {}", self.request, source.kind());
        // A fetch that is already complete wins over a concurrent cancellation
        let result = tokio::select! {
            biased;
            result = source.fetch(self.request, self.cancel) => result.map(|raw| raw.map(Arc::new)),
            _ = self.cancel.cancelled() => Err(MetadataError::Cancelled),
        };

        self.fetched[index] = Some(result.clone());
        result
    }
}

/// Resolves package metadata by falling back through the configured tiers
pub struct MetadataResolver {
    sources: Vec<Arc<dyn MetadataSource>>,
}

impl MetadataResolver {
    /// Create a resolver trying `sources` in the given order
    pub fn new(sources: Vec<Arc<dyn MetadataSource>>) -> Self {
        Self { sources }
    }

    /// Build the standard tiers over one shared middleware chain
    ///
    /// Package archives bypass the response cache: the extracted manifest is
    /// their persistent copy.
    pub fn from_config(config: &ResolverConfig) -> Result<Self, ClientError> {
        let clients = build_clients(config)?;
        let downloader = Arc::new(PackageDownloader::new(
            clients.uncached,
            &config.registry.package_content_url,
            config.cache.packages_dir(),
        ));

        let mut sources: Vec<Arc<dyn MetadataSource>> = vec![
            Arc::new(LocalManifestSource::new(downloader)),
            Arc::new(RegistryPageSource::new(
                Arc::clone(&clients.cached),
                &config.registry.base_url,
            )),
        ];
        if let Some(custom_api) = &config.custom_api {
            sources.push(Arc::new(CustomApiSource::new(
                clients.cached,
                &custom_api.base_url,
            )));
        }

        Ok(Self::new(sources))
    }

    pub fn sources(&self) -> &[Arc<dyn MetadataSource>] {
        &self.sources
    }

    /// Resolve every property of `request`
    ///
    /// A failure on one property never prevents the others from resolving.
    /// Once `cancel` fires no further tier is fetched and every property not
    /// yet resolved reports [`MetadataError::Cancelled`].
    pub async fn resolve(
        &self,
        request: &PackageRequest,
        cancel: &CancellationToken,
    ) -> PackageMetadata {
        info!("Resolving metadata for {}", request);

        let mut tiers = Tiers::new(&self.sources, request, cancel);
        let mut values: IndexMap<MetadataProperty, PropertyValue> = IndexMap::new();

        for property in MetadataProperty::ALL {
            if values.contains_key(&property) {
                continue;
            }
            if cancel.is_cancelled() {
                values.insert(property, Err(MetadataError::Cancelled));
                continue;
            }

            if property.is_license() {
                for (property, value) in resolve_license_group(&mut tiers).await {
                    values.insert(property, value);
                }
            } else {
                let value = resolve_plain(&mut tiers, property).await;
                values.insert(property, value);
            }
        }

        PackageMetadata::new(values)
    }
}

/// First non-blank value for `property`, stopping at the first failing tier
async fn resolve_plain(tiers: &mut Tiers<'_>, property: MetadataProperty) -> PropertyValue {
    for index in 0..tiers.len() {
        if let Some(raw) = tiers.get(index).await? {
            if let Some(value) = raw.field(property) {
                return Ok(Some(value.to_string()));
            }
        }
    }
    Ok(None)
}

async fn resolve_license_group(tiers: &mut Tiers<'_>) -> Vec<(MetadataProperty, PropertyValue)> {
    let mut search_error = None;

    for index in 0..tiers.len() {
        let raw = match tiers.get(index).await {
            Ok(Some(raw)) => raw,
            Ok(None) => continue,
            Err(e) => {
                search_error = Some(e);
                break;
            }
        };

        let identifiers = extract_identifiers(raw.license.as_deref());
        let Some(primary) = identifiers.first().cloned() else {
            continue;
        };
        let names = identifiers.into_iter().collect::<Vec<_>>().join(", ");

        return vec![
            (MetadataProperty::LicensesNames, Ok(Some(names))),
            (MetadataProperty::License, Ok(Some(primary))),
            (
                MetadataProperty::LicenseUrl,
                Ok(raw.field(MetadataProperty::LicenseUrl).map(str::to_string)),
            ),
            (
                MetadataProperty::LicenseContent,
                Ok(raw.field(MetadataProperty::LicenseContent).map(str::to_string)),
            ),
        ];
    }

    // No tier named a license; URL and content stand on their own
    let unresolved: PropertyValue = match search_error {
        Some(e) => Err(e),
        None => Ok(None),
    };
    let license_url = resolve_plain(tiers, MetadataProperty::LicenseUrl).await;
    let license_content = resolve_plain(tiers, MetadataProperty::LicenseContent).await;

    vec![
        (MetadataProperty::LicensesNames, unresolved.clone()),
        (MetadataProperty::License, unresolved),
        (MetadataProperty::LicenseUrl, license_url),
        (MetadataProperty::LicenseContent, license_content),
    ]
}
