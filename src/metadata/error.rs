use std::sync::Arc;

use thiserror::Error;

use crate::flight::Cancelled;
use crate::http::HttpError;

/// Failure resolving a single metadata property
///
/// Absence of a value is `Ok(None)`, never an error.
#[derive(Debug, Clone, Error)]
pub enum MetadataError {
    #[error("Custom API request to {url} failed: {source}")]
    CustomApi { url: String, source: HttpError },

    #[error("Resolution cancelled")]
    Cancelled,
}

impl From<Cancelled> for MetadataError {
    fn from(_: Cancelled) -> Self {
        MetadataError::Cancelled
    }
}

/// Failure downloading or unpacking a package for the local tier
///
/// Always recovered by the local tier; cloneable so coalesced downloads can
/// share it.
#[derive(Debug, Clone, Error)]
pub enum DownloadError {
    #[error("Package download failed: {0}")]
    Http(#[from] HttpError),

    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Invalid package archive: {0}")]
    Archive(String),

    #[error("Package archive has no manifest")]
    MissingManifest,

    #[error("Invalid package identity {id} {version}")]
    InvalidIdentity { id: String, version: String },
}

impl From<std::io::Error> for DownloadError {
    fn from(err: std::io::Error) -> Self {
        DownloadError::Io(Arc::new(err))
    }
}

impl From<zip::result::ZipError> for DownloadError {
    fn from(err: zip::result::ZipError) -> Self {
        DownloadError::Archive(err.to_string())
    }
}
