//! Per-domain rate limiting middleware
//!
//! Every destination host gets its own token bucket, created on first use and
//! configured from the most specific matching host pattern (or the default).
//! A request takes a permit when one is available and nobody is queued ahead
//! of it; otherwise it waits in a bounded FIFO queue until the bucket is
//! replenished, or is rejected immediately when the queue is full.
//!
//! Bookkeeping happens under short-lived locks; waiting happens on a oneshot
//! channel with no lock held. A single replenisher task per bucket runs while
//! its queue is non-empty and hands out permits strictly in arrival order.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::{RateLimitConfig, RateLimitsConfig};
use crate::http::error::HttpError;
use crate::http::host_pattern::{HostPattern, best_match};
use crate::http::transport::Transport;
use crate::http::types::{HttpRequest, HttpResponse};

/// Host patterns with their limits plus the fallback limit
#[derive(Debug, Clone)]
pub struct RateLimitRules {
    default: RateLimitConfig,
    hosts: Vec<(HostPattern, RateLimitConfig)>,
}

impl RateLimitRules {
    pub fn new(default: RateLimitConfig) -> Self {
        Self {
            default,
            hosts: Vec::new(),
        }
    }

    pub fn with_host(mut self, pattern: &str, config: RateLimitConfig) -> Self {
        self.hosts.push((HostPattern::parse(pattern), config));
        self
    }

    /// Limits applying to `host`
    pub fn config_for(&self, host: &str) -> RateLimitConfig {
        best_match(host, &self.hosts)
            .copied()
            .unwrap_or(self.default)
    }
}

impl From<&RateLimitsConfig> for RateLimitRules {
    fn from(config: &RateLimitsConfig) -> Self {
        config
            .hosts
            .iter()
            .fold(Self::new(config.default), |rules, (pattern, limit)| {
                rules.with_host(pattern, *limit)
            })
    }
}

struct QueuedRequest {
    ticket: u64,
    grant: oneshot::Sender<()>,
}

struct BucketState {
    permits: u32,
    window_start: Instant,
    queue: VecDeque<QueuedRequest>,
    next_ticket: u64,
    replenishing: bool,
}

enum Admission {
    Granted,
    Queued {
        ticket: u64,
        granted: oneshot::Receiver<()>,
    },
    Rejected,
}

/// Token bucket for one host
struct DomainBucket {
    host: String,
    config: RateLimitConfig,
    state: Mutex<BucketState>,
}

impl DomainBucket {
    fn new(host: String, config: RateLimitConfig) -> Self {
        Self {
            host,
            config,
            state: Mutex::new(BucketState {
                permits: config.permits(),
                window_start: Instant::now(),
                queue: VecDeque::new(),
                next_ticket: 0,
                replenishing: false,
            }),
        }
    }

    /// Refill the bucket for every full period elapsed since the window started
    fn replenish(&self, state: &mut BucketState, now: Instant) {
        let period = self.config.replenishment_period();
        let elapsed = now.saturating_duration_since(state.window_start);
        if elapsed < period {
            return;
        }
        let periods = (elapsed.as_nanos() / period.as_nanos()).min(u32::MAX as u128) as u32;
        state.window_start += period * periods;
        state.permits = self.config.permits();
    }

    /// Hand available permits to queued requests in arrival order
    fn grant_queued(state: &mut BucketState) {
        while state.permits > 0 {
            let Some(next) = state.queue.pop_front() else {
                break;
            };
            // A dropped receiver means the caller went away; it takes no permit
            if next.grant.send(()).is_ok() {
                state.permits -= 1;
            }
        }
    }

    fn admit(self: &Arc<Self>) -> Admission {
        let mut state = self.state.lock();
        self.replenish(&mut state, Instant::now());
        Self::grant_queued(&mut state);

        if state.queue.is_empty() && state.permits > 0 {
            state.permits -= 1;
            return Admission::Granted;
        }
        if state.queue.len() >= self.config.queue_limit {
            return Admission::Rejected;
        }

        let (grant, granted) = oneshot::channel();
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.queue.push_back(QueuedRequest { ticket, grant });

        if !state.replenishing {
            state.replenishing = true;
            tokio::spawn(Arc::clone(self).run_replenisher());
        }

        Admission::Queued { ticket, granted }
    }

    /// Release queued requests as periods elapse, until the queue drains
    async fn run_replenisher(self: Arc<Self>) {
        loop {
            let next_window = {
                let state = self.state.lock();
                state.window_start + self.config.replenishment_period()
            };
            tokio::time::sleep_until(next_window).await;

            let mut state = self.state.lock();
            self.replenish(&mut state, Instant::now());
            Self::grant_queued(&mut state);
            if state.queue.is_empty() {
                state.replenishing = false;
                return;
            }
        }
    }

    /// Leave the queue after cancellation
    ///
    /// When the permit was granted in the meantime it goes back to the bucket.
    fn withdraw(&self, ticket: u64) {
        let mut state = self.state.lock();
        if let Some(index) = state.queue.iter().position(|q| q.ticket == ticket) {
            state.queue.remove(index);
            return;
        }
        state.permits = (state.permits + 1).min(self.config.permits());
        Self::grant_queued(&mut state);
    }

    async fn acquire(self: &Arc<Self>, cancel: &CancellationToken) -> Result<(), HttpError> {
        if cancel.is_cancelled() {
            return Err(HttpError::Cancelled);
        }

        let (ticket, granted) = match self.admit() {
            Admission::Granted => return Ok(()),
            Admission::Rejected => {
                warn!("Rate limit queue full for {}, rejecting request", self.host);
                return Err(HttpError::RateLimited {
                    host: self.host.clone(),
                });
            }
            Admission::Queued { ticket, granted } => (ticket, granted),
        };

        debug!("Queued request #{} for {}", ticket, self.host);

        let mut queued = QueuedTicket {
            bucket: &**self,
            ticket,
            settled: false,
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(HttpError::Cancelled),
            result = granted => {
                queued.settled = result.is_ok();
                result.map_err(|_| HttpError::Cancelled)
            }
        }
    }
}

/// Withdraws a queued ticket unless its grant was received
///
/// Covers both token cancellation and the caller dropping the request future.
struct QueuedTicket<'a> {
    bucket: &'a DomainBucket,
    ticket: u64,
    settled: bool,
}

impl Drop for QueuedTicket<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.bucket.withdraw(self.ticket);
        }
    }
}

/// Middleware limiting outbound requests per destination host
pub struct DomainRateLimiter {
    rules: RateLimitRules,
    buckets: Mutex<HashMap<String, Arc<DomainBucket>>>,
    inner: Arc<dyn Transport>,
}

impl DomainRateLimiter {
    pub fn new(rules: RateLimitRules, inner: Arc<dyn Transport>) -> Self {
        Self {
            rules,
            buckets: Mutex::new(HashMap::new()),
            inner,
        }
    }

    fn bucket(&self, host: &str) -> Arc<DomainBucket> {
        let mut buckets = self.buckets.lock();
        Arc::clone(buckets.entry(host.to_string()).or_insert_with(|| {
            let config = self.rules.config_for(host);
            debug!(
                "Rate limiting {} at {} per {:?} (queue {})",
                host,
                config.permits(),
                config.replenishment_period(),
                config.queue_limit
            );
            Arc::new(DomainBucket::new(host.to_string(), config))
        }))
    }
}

#[async_trait]
impl Transport for DomainRateLimiter {
    async fn send(
        &self,
        request: HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, HttpError> {
        let host = request
            .host()
            .ok_or_else(|| HttpError::MissingHost(request.url.to_string()))?;

        self.bucket(&host).acquire(cancel).await?;
        self.inner.send(request, cancel).await
    }
}
