//! Persistent response cache middleware
//!
//! Successful GET responses are kept in memory and written to disk, one JSON
//! file per URL named after the SHA-256 of the URL. The directory is scanned
//! once when the cache is opened; unreadable or mismatched files are skipped.
//! Concurrent misses for the same URL are coalesced into one dispatch.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::flight::SingleFlight;
use crate::http::error::HttpError;
use crate::http::transport::Transport;
use crate::http::types::{HttpRequest, HttpResponse};

const ENTRY_EXTENSION: &str = "json";

/// On-disk representation of one cached response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CachedResponse {
    url: String,
    status: u16,
    headers: Vec<(String, String)>,
    /// Base64-encoded body
    body: String,
    cached_at: DateTime<Utc>,
}

impl CachedResponse {
    fn new(url: &str, response: &HttpResponse) -> Self {
        Self {
            url: url.to_string(),
            status: response.status,
            headers: response.headers.clone(),
            body: BASE64.encode(&response.body),
            cached_at: Utc::now(),
        }
    }

    fn into_response(self) -> Result<(String, HttpResponse), String> {
        let body = BASE64
            .decode(self.body.as_bytes())
            .map_err(|e| format!("invalid body encoding: {}", e))?;
        Ok((
            self.url,
            HttpResponse {
                status: self.status,
                headers: self.headers,
                body,
            },
        ))
    }
}

/// File name for a URL: lowercase hex SHA-256 plus extension
pub fn entry_file_name(url: &str) -> String {
    format!(
        "{}.{}",
        hex::encode(Sha256::digest(url.as_bytes())),
        ENTRY_EXTENSION
    )
}

/// In-memory view of the cache directory
struct ResponseStore {
    dir: PathBuf,
    entries: RwLock<HashMap<String, HttpResponse>>,
}

impl ResponseStore {
    fn load(dir: &Path) -> io::Result<Self> {
        std::fs::create_dir_all(dir)?;

        let mut entries = HashMap::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            match Self::read_entry(&path) {
                Ok((url, response)) => {
                    entries.insert(url, response);
                }
                Err(e) => warn!("Skipping cache entry {:?}: {}", path, e),
            }
        }

        info!("Loaded {} cached responses from {:?}", entries.len(), dir);
        Ok(Self {
            dir: dir.to_path_buf(),
            entries: RwLock::new(entries),
        })
    }

    fn read_entry(path: &Path) -> Result<(String, HttpResponse), String> {
        let contents = std::fs::read(path).map_err(|e| e.to_string())?;
        let cached: CachedResponse =
            serde_json::from_slice(&contents).map_err(|e| e.to_string())?;

        let expected = entry_file_name(&cached.url);
        let actual = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if actual != expected {
            return Err(format!("file name does not match URL {}", cached.url));
        }

        cached.into_response()
    }

    fn get(&self, url: &str) -> Option<HttpResponse> {
        self.entries.read().get(url).cloned()
    }

    /// Keep the response in memory, then persist it on a best-effort basis
    async fn insert(&self, url: &str, response: &HttpResponse) {
        self.entries
            .write()
            .insert(url.to_string(), response.clone());

        if let Err(e) = self.persist(url, response).await {
            warn!("Failed to persist cached response for {}: {}", url, e);
        }
    }

    async fn persist(&self, url: &str, response: &HttpResponse) -> io::Result<()> {
        let contents = serde_json::to_vec(&CachedResponse::new(url, response))?;
        let path = self.dir.join(entry_file_name(url));
        let tmp_path = path.with_extension("tmp");

        tokio::fs::write(&tmp_path, contents).await?;
        if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e);
        }
        debug!("Persisted response for {} to {:?}", url, path);
        Ok(())
    }
}

/// Middleware answering repeated GETs from a persistent cache
pub struct PersistentResponseCache {
    store: Arc<ResponseStore>,
    flights: SingleFlight<String, Result<HttpResponse, HttpError>>,
    inner: Arc<dyn Transport>,
}

impl PersistentResponseCache {
    /// Open (creating if needed) the cache directory and load its entries
    pub fn open(dir: &Path, inner: Arc<dyn Transport>) -> io::Result<Self> {
        Ok(Self {
            store: Arc::new(ResponseStore::load(dir)?),
            flights: SingleFlight::new(),
            inner,
        })
    }

    /// Number of responses currently cached
    pub fn len(&self) -> usize {
        self.store.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, url: &str) -> bool {
        self.store.entries.read().contains_key(url)
    }
}

#[async_trait]
impl Transport for PersistentResponseCache {
    async fn send(
        &self,
        request: HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, HttpError> {
        if request.method != Method::GET {
            return self.inner.send(request, cancel).await;
        }

        let url = request.url.to_string();
        if let Some(hit) = self.store.get(&url) {
            debug!("Cache hit for {}", url);
            return Ok(hit);
        }

        let store = Arc::clone(&self.store);
        let inner = Arc::clone(&self.inner);
        let key = url.clone();
        let compute = move || async move {
            // A flight that completed just before this one was created
            if let Some(hit) = store.get(&url) {
                return Ok(hit);
            }

            debug!("Cache miss for {}", url);
            // The flight outlives any single caller's token
            let result = inner.send(request, &CancellationToken::new()).await;
            if let Ok(response) = &result {
                if response.is_success() {
                    store.insert(&url, response).await;
                }
            }
            result
        };

        self.flights
            .get_or_add_with(
                key,
                compute,
                |result: &Result<HttpResponse, HttpError>| {
                    result.as_ref().is_ok_and(HttpResponse::is_success)
                },
                cancel,
            )
            .await?
    }
}
