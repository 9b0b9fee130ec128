//! Transport trait and the reqwest-backed implementation
//!
//! Middlewares implement [`Transport`] themselves and wrap another
//! `Arc<dyn Transport>`, so chains are built by nesting:
//!
//! ```text
//! PersistentResponseCache ──▶ DomainRateLimiter ──▶ ReqwestTransport ──▶ network
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::http::error::HttpError;
use crate::http::types::{HttpRequest, HttpResponse};

/// Something that can dispatch an HTTP request
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send the request, giving up with [`HttpError::Cancelled`] once `cancel` fires
    async fn send(
        &self,
        request: HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, HttpError>;
}

/// Transport that talks to the network through reqwest
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, HttpError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    async fn dispatch(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        debug!("{} {}", request.method, request.url);

        let mut builder = self.client.request(request.method, request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(
        &self,
        request: HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, HttpError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(HttpError::Cancelled),
            result = self.dispatch(request) => result,
        }
    }
}
