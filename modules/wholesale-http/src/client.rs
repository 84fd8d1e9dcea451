use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, Response};
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, warn};

use crate::error::HttpError;
use crate::token_bucket::TokenBucket;

/// Per-host rate limiting / retry configuration. Adapters that need a
/// non-default ceiling (e.g. OwnerClan's `rate_limit_per_minute = 120`)
/// register one of these before making requests.
#[derive(Debug, Clone)]
pub struct HostLimits {
    pub rps: f64,
    pub max_concurrent: usize,
    pub max_retries: u32,
    pub backoff_ceiling: Duration,
}

impl HostLimits {
    pub fn from_per_minute(per_minute: u32) -> Self {
        Self {
            rps: per_minute as f64 / 60.0,
            max_concurrent: 4,
            max_retries: 3,
            backoff_ceiling: Duration::from_secs(30),
        }
    }
}

impl Default for HostLimits {
    fn default() -> Self {
        Self { rps: 5.0, max_concurrent: 4, max_retries: 3, backoff_ceiling: Duration::from_secs(30) }
    }
}

struct HostState {
    bucket: TokenBucket,
    inflight: Semaphore,
    max_retries: u32,
    backoff_ceiling: Duration,
}

/// A `reqwest::Client` wrapper that enforces a token bucket and a bounded
/// concurrent in-flight count per host, and retries transient failures
/// with full-jitter exponential backoff (§4.2).
pub struct RateLimitedClient {
    inner: reqwest::Client,
    hosts: Mutex<HashMap<String, Arc<HostState>>>,
    default_limits: HostLimits,
}

impl RateLimitedClient {
    pub fn new(default_limits: HostLimits) -> Self {
        let inner = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build reqwest client");
        Self { inner, hosts: Mutex::new(HashMap::new()), default_limits }
    }

    /// Register an explicit limit for a host (overrides the default).
    pub async fn configure_host(&self, host: &str, limits: HostLimits) {
        let mut hosts = self.hosts.lock().await;
        hosts.insert(
            host.to_string(),
            Arc::new(HostState {
                bucket: TokenBucket::new(limits.rps),
                inflight: Semaphore::new(limits.max_concurrent),
                max_retries: limits.max_retries,
                backoff_ceiling: limits.backoff_ceiling,
            }),
        );
    }

    async fn host_state(&self, host: &str) -> Arc<HostState> {
        let mut hosts = self.hosts.lock().await;
        if let Some(state) = hosts.get(host) {
            return state.clone();
        }
        let state = Arc::new(HostState {
            bucket: TokenBucket::new(self.default_limits.rps),
            inflight: Semaphore::new(self.default_limits.max_concurrent),
            max_retries: self.default_limits.max_retries,
            backoff_ceiling: self.default_limits.backoff_ceiling,
        });
        hosts.insert(host.to_string(), state.clone());
        state
    }

    /// Issue a GET request against `url`, respecting the host's rate limit
    /// and retrying transient failures.
    pub async fn get(&self, url: &str) -> Result<Response, HttpError> {
        self.request(Method::GET, url, |b| b).await
    }

    /// Issue a request built via `build`, e.g. `|b| b.bearer_auth(token).json(&body)`.
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        build: impl Fn(reqwest::RequestBuilder) -> reqwest::RequestBuilder,
    ) -> Result<Response, HttpError> {
        let host = reqwest::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| url.to_string());
        let state = self.host_state(&host).await;
        let max_retries = state.max_retries;
        let ceiling = state.backoff_ceiling;

        let mut attempt = 0u32;
        loop {
            if let Some(wait) = state.bucket.try_acquire() {
                tokio::time::sleep(wait).await;
                continue;
            }

            let _permit = state.inflight.acquire().await.map_err(|_| HttpError::Cancelled)?;
            let builder = build(self.inner.request(method.clone(), url));
            let outcome = builder.send().await.map_err(HttpError::from);
            drop(_permit);

            let err = match outcome {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) if resp.status().as_u16() == 429 => {
                    let retry_after_secs = resp
                        .headers()
                        .get("retry-after")
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| v.parse::<u64>().ok())
                        .unwrap_or(1);
                    HttpError::RateLimited { retry_after_secs }
                }
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    let body = resp.text().await.unwrap_or_default();
                    HttpError::Status { status, body }
                }
                Err(e) => e,
            };

            if !err.is_transient() || attempt >= max_retries {
                if err.is_transient() {
                    return Err(HttpError::RetriesExhausted { attempts: attempt, last: err.to_string() });
                }
                return Err(err);
            }

            let backoff = backoff_for(attempt, ceiling, &err);
            warn!(attempt, host = %host, error = %err, wait_ms = backoff.as_millis() as u64, "retrying request");
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }
}

/// Full-jitter exponential backoff: `uniform(0, min(ceiling, base * 2^attempt))`.
/// An explicit `Retry-After` overrides the computed jitter floor.
fn backoff_for(attempt: u32, ceiling: Duration, err: &HttpError) -> Duration {
    if let HttpError::RateLimited { retry_after_secs } = err {
        return Duration::from_secs(*retry_after_secs).min(ceiling);
    }
    let base = Duration::from_millis(200);
    let exp = base.as_millis() as u64 * 2u64.saturating_pow(attempt);
    let capped = exp.min(ceiling.as_millis() as u64).max(1);
    let jittered = rand::random::<u64>() % capped;
    debug!(attempt, capped, jittered, "computed backoff");
    Duration::from_millis(jittered)
}
