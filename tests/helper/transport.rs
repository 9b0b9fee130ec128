//! In-process transports for middleware tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use package_meta::http::{HttpError, HttpRequest, HttpResponse, Transport};

/// Answers every request with a fixed status, recording what reached it
pub struct RecordingTransport {
    status: u16,
    delay: Duration,
    calls: AtomicUsize,
    urls: Mutex<Vec<String>>,
}

impl RecordingTransport {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            urls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(
        &self,
        request: HttpRequest,
        _cancel: &CancellationToken,
    ) -> Result<HttpResponse, HttpError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().push(request.url.to_string());
        tokio::time::sleep(self.delay).await;
        Ok(HttpResponse::new(
            self.status,
            format!("body of {}", request.url),
        ))
    }
}
