//! Metadata source trait shared by the resolution tiers

use std::fmt;
use std::path::PathBuf;

#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::metadata::error::MetadataError;
use crate::metadata::property::MetadataProperty;

/// Package identity plus an optional explicit manifest location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRequest {
    pub id: String,
    pub version: String,
    pub manifest_path: Option<PathBuf>,
}

impl PackageRequest {
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
            manifest_path: None,
        }
    }

    pub fn with_manifest(mut self, path: impl Into<PathBuf>) -> Self {
        self.manifest_path = Some(path.into());
        self
    }
}

impl fmt::Display for PackageRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.version)
    }
}

/// Tier a source belongs to, in fallback order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SourceKind {
    LocalManifest,
    RegistryPage,
    CustomApi,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceKind::LocalManifest => "local manifest",
            SourceKind::RegistryPage => "registry page",
            SourceKind::CustomApi => "custom API",
        };
        f.write_str(name)
    }
}

/// Raw property values as one source reports them
///
/// `license` holds the license expression or name text before identifier
/// extraction. The custom API returns this shape as camelCase JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawMetadata {
    pub title: Option<String>,
    pub authors: Option<String>,
    pub description: Option<String>,
    pub project_url: Option<String>,
    pub repository_url: Option<String>,
    pub copyright: Option<String>,
    pub tags: Option<String>,
    pub license: Option<String>,
    pub license_url: Option<String>,
    pub license_content: Option<String>,
}

impl RawMetadata {
    /// Value reported for a plain property; blank strings count as absent
    ///
    /// `LicensesNames` and `License` are derived from `license` by the
    /// resolver and are not plain fields.
    pub fn field(&self, property: MetadataProperty) -> Option<&str> {
        let value = match property {
            MetadataProperty::Title => &self.title,
            MetadataProperty::Authors => &self.authors,
            MetadataProperty::Description => &self.description,
            MetadataProperty::ProjectUrl => &self.project_url,
            MetadataProperty::RepositoryUrl => &self.repository_url,
            MetadataProperty::Copyright => &self.copyright,
            MetadataProperty::Tags => &self.tags,
            MetadataProperty::LicenseUrl => &self.license_url,
            MetadataProperty::LicenseContent => &self.license_content,
            MetadataProperty::LicensesNames | MetadataProperty::License => &None,
        };
        value.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }
}

/// One resolution tier
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait MetadataSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Fetch everything this source knows about the package
    ///
    /// # Returns
    /// * `Ok(Some(raw))` - The source answered
    /// * `Ok(None)` - The source has nothing for this package
    /// * `Err(MetadataError)` - A failure that must surface on the properties reaching this tier
    async fn fetch(
        &self,
        request: &PackageRequest,
        cancel: &CancellationToken,
    ) -> Result<Option<RawMetadata>, MetadataError>;
}
