//! Custom metadata API tier
//!
//! `GET <base>/<id>/<version>` answering a JSON object with optional camelCase
//! fields (`title`, `authors`, `projectUrl`, `license`, ...). Unlike the other
//! tiers, every failure here is reported to the caller.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::http::{HttpError, HttpRequest, Transport};
use crate::metadata::error::MetadataError;
use crate::metadata::source::{MetadataSource, PackageRequest, RawMetadata, SourceKind};

/// Third tier: an optional private metadata API
pub struct CustomApiSource {
    client: Arc<dyn Transport>,
    base_url: String,
}

impl CustomApiSource {
    pub fn new(client: Arc<dyn Transport>, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn endpoint(&self, id: &str, version: &str) -> String {
        format!("{}/{}/{}", self.base_url, id, version)
    }

    async fn request(&self, url: &str, cancel: &CancellationToken) -> Result<RawMetadata, HttpError> {
        let request = HttpRequest::get(url)?.with_header("Accept", "application/json");
        let response = self.client.send(request, cancel).await?;

        if !response.is_success() {
            return Err(HttpError::Status {
                status: response.status,
                url: url.to_string(),
            });
        }

        serde_json::from_slice(&response.body)
            .map_err(|e| HttpError::InvalidResponse(format!("{}: {}", url, e)))
    }
}

#[async_trait::async_trait]
impl MetadataSource for CustomApiSource {
    fn kind(&self) -> SourceKind {
        SourceKind::CustomApi
    }

    async fn fetch(
        &self,
        request: &PackageRequest,
        cancel: &CancellationToken,
    ) -> Result<Option<RawMetadata>, MetadataError> {
        let url = self.endpoint(&request.id, &request.version);
        debug!("Querying custom API: {}", url);

        match self.request(&url, cancel).await {
            Ok(raw) => Ok(Some(raw)),
            Err(HttpError::Cancelled) => Err(MetadataError::Cancelled),
            Err(source) => Err(MetadataError::CustomApi { url, source }),
        }
    }
}
