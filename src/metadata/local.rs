//! Local manifest tier
//!
//! Reads the `.nuspec` of a previously downloaded package. When no local copy
//! exists the package archive is downloaded once, its root manifest and
//! license file are extracted into the packages directory, and the manifest
//! is read from there.

use std::io::{Cursor, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zip::ZipArchive;

use crate::flight::SingleFlight;
use crate::http::{HttpError, HttpRequest, Transport};
use crate::metadata::error::{DownloadError, MetadataError};
use crate::metadata::nuspec;
use crate::metadata::source::{MetadataSource, PackageRequest, RawMetadata, SourceKind};

/// Downloads packages and unpacks their manifests into the packages directory
pub struct PackageDownloader {
    client: Arc<dyn Transport>,
    content_url: String,
    packages_dir: PathBuf,
    flights: SingleFlight<(String, String), Result<PathBuf, DownloadError>>,
}

impl PackageDownloader {
    pub fn new(client: Arc<dyn Transport>, content_url: &str, packages_dir: PathBuf) -> Self {
        Self {
            client,
            content_url: content_url.trim_end_matches('/').to_string(),
            packages_dir,
            flights: SingleFlight::new(),
        }
    }

    /// Where the manifest of `id` `version` lives once downloaded
    ///
    /// Both parts become single directory names under the packages directory,
    /// so anything other than package id and version characters is rejected.
    pub fn manifest_path(&self, id: &str, version: &str) -> Result<PathBuf, DownloadError> {
        if !is_path_segment(id) || !is_path_segment(version) {
            return Err(DownloadError::InvalidIdentity {
                id: id.to_string(),
                version: version.to_string(),
            });
        }
        let id = id.to_lowercase();
        Ok(self
            .packages_dir
            .join(&id)
            .join(version.to_lowercase())
            .join(format!("{}.nuspec", id)))
    }

    /// Flat container URL of the package archive
    pub fn package_url(&self, id: &str, version: &str) -> String {
        let id = id.to_lowercase();
        let version = version.to_lowercase();
        format!(
            "{}/{}/{}/{}.{}.nupkg",
            self.content_url, id, version, id, version
        )
    }

    /// Return the manifest path, downloading the package first if needed
    ///
    /// Concurrent calls for the same package share one download.
    pub async fn ensure_manifest(
        &self,
        id: &str,
        version: &str,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, DownloadError> {
        let manifest_path = self.manifest_path(id, version)?;
        if tokio::fs::try_exists(&manifest_path).await.unwrap_or(false) {
            return Ok(manifest_path);
        }

        let key = (id.to_lowercase(), version.to_lowercase());
        let client = Arc::clone(&self.client);
        let url = self.package_url(id, version);

        let compute = move || download(client, url, manifest_path);

        self.flights
            .get_or_add(key, compute, cancel)
            .await
            .map_err(|_| DownloadError::Http(HttpError::Cancelled))?
    }
}

fn is_path_segment(value: &str) -> bool {
    !value.is_empty()
        && !value.chars().all(|c| c == '.')
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '+'))
}

async fn download(
    client: Arc<dyn Transport>,
    url: String,
    manifest_path: PathBuf,
) -> Result<PathBuf, DownloadError> {
    info!("Downloading {}", url);
    let request = HttpRequest::get(&url)?;
    // The download outlives any single caller's token
    let response = client.send(request, &CancellationToken::new()).await?;
    if !response.is_success() {
        return Err(DownloadError::Http(HttpError::Status {
            status: response.status,
            url,
        }));
    }

    let body = response.body;
    let destination = manifest_path.clone();
    tokio::task::spawn_blocking(move || extract_package(&body, &destination))
        .await
        .map_err(|e| DownloadError::Archive(e.to_string()))??;
    Ok(manifest_path)
}

/// Unpack the root manifest and its license file next to `manifest_path`
///
/// The manifest is written last so its presence marks a complete extraction.
fn extract_package(bytes: &[u8], manifest_path: &Path) -> Result<(), DownloadError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;

    let entry_name = archive
        .file_names()
        .find(|name| !name.contains('/') && name.to_ascii_lowercase().ends_with(".nuspec"))
        .map(str::to_string)
        .ok_or(DownloadError::MissingManifest)?;

    let mut manifest = String::new();
    archive.by_name(&entry_name)?.read_to_string(&mut manifest)?;

    let package_dir = manifest_path
        .parent()
        .ok_or_else(|| DownloadError::Archive("manifest path has no parent".to_string()))?;
    std::fs::create_dir_all(package_dir)?;

    let license_file = nuspec::parse(&manifest)
        .ok()
        .and_then(|parsed| parsed.license_file);
    if let Some(license_file) = license_file {
        let entry_name = license_file.replace('\\', "/");
        match archive.by_name(&entry_name) {
            Ok(mut entry) => match entry.enclosed_name() {
                Some(relative) => {
                    let mut contents = Vec::new();
                    entry.read_to_end(&mut contents)?;
                    let path = package_dir.join(relative);
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(path, contents)?;
                }
                None => warn!("Ignoring license file with unsafe path: {}", entry_name),
            },
            Err(zip::result::ZipError::FileNotFound) => {
                warn!("License file {} not found in package", entry_name)
            }
            Err(e) => return Err(e.into()),
        }
    }

    let tmp_path = manifest_path.with_extension("nuspec.tmp");
    std::fs::write(&tmp_path, manifest)?;
    std::fs::rename(&tmp_path, manifest_path)?;
    debug!("Extracted {} to {:?}", entry_name, manifest_path);
    Ok(())
}

/// First tier: the package's own manifest on disk
pub struct LocalManifestSource {
    downloader: Arc<PackageDownloader>,
}

impl LocalManifestSource {
    pub fn new(downloader: Arc<PackageDownloader>) -> Self {
        Self { downloader }
    }

    async fn locate(
        &self,
        request: &PackageRequest,
        cancel: &CancellationToken,
    ) -> Result<Option<PathBuf>, MetadataError> {
        if let Some(path) = &request.manifest_path {
            if tokio::fs::try_exists(path).await.unwrap_or(false) {
                return Ok(Some(path.clone()));
            }
            warn!("Manifest {:?} not found, falling back to package download", path);
        }

        match self
            .downloader
            .ensure_manifest(&request.id, &request.version, cancel)
            .await
        {
            Ok(path) => Ok(Some(path)),
            Err(DownloadError::Http(HttpError::Cancelled)) => Err(MetadataError::Cancelled),
            Err(e @ DownloadError::InvalidIdentity { .. }) => {
                warn!("Not downloading {}: {}", request, e);
                Ok(None)
            }
            Err(e) => {
                warn!("Failed to download {}: {}", request, e);
                Ok(None)
            }
        }
    }
}

#[async_trait::async_trait]
impl MetadataSource for LocalManifestSource {
    fn kind(&self) -> SourceKind {
        SourceKind::LocalManifest
    }

    async fn fetch(
        &self,
        request: &PackageRequest,
        cancel: &CancellationToken,
    ) -> Result<Option<RawMetadata>, MetadataError> {
        let Some(path) = self.locate(request, cancel).await? else {
            return Ok(None);
        };

        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) => {
                warn!("Failed to read manifest {:?}: {}", path, e);
                return Ok(None);
            }
        };
        let manifest = match nuspec::parse(&contents) {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!("Failed to parse manifest {:?}: {}", path, e);
                return Ok(None);
            }
        };

        let mut metadata = manifest.metadata;
        if let Some(license_file) = manifest.license_file {
            metadata.license_content = read_license_file(&path, &license_file).await;
        }
        Ok(Some(metadata))
    }
}

/// Read a license file stored relative to the manifest directory
async fn read_license_file(manifest_path: &Path, license_file: &str) -> Option<String> {
    let relative = PathBuf::from(license_file.replace('\\', "/"));
    if !relative
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
    {
        warn!("Ignoring license file with unsafe path: {}", license_file);
        return None;
    }

    let path = manifest_path.parent()?.join(relative);
    match tokio::fs::read_to_string(&path).await {
        Ok(contents) => Some(contents),
        Err(e) => {
            warn!("Failed to read license file {:?}: {}", path, e);
            None
        }
    }
}
