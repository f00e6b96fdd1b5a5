//! Page transport
//!
//! Every network access of the crawler goes through a [`Transport`]:
//! - one attempt is a `fetch_once` (plain HTTP or a rendering service)
//! - `fetch` wraps it in the bounded retry loop with linear backoff
//! - every attempt first claims a slot from the shared [`RequestPacer`]
//! - every successful fetch is followed by the politeness delay

use crate::config::{CrawlerConfig, TransportConfig};
use crate::crawler::pacing::{RequestPacer, RotationPool};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::{Client, Proxy};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors surfaced by a transport
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("Network error fetching {url}: {message}")]
    Network { url: String, message: String },

    #[error("Timed out fetching {url}")]
    Timeout { url: String },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Renderer returned {status}: {message}")]
    Browser { status: u16, message: String },

    #[error("Gave up on {url} after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        last_error: Box<FetchError>,
    },
}

impl FetchError {
    pub(crate) fn from_reqwest(url: &str, error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
            }
        } else {
            Self::Network {
                url: url.to_string(),
                message: error.to_string(),
            }
        }
    }
}

/// A fetched (and, for the browser transport, rendered) page
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// URL that was requested
    pub url: String,
    pub status: u16,
    pub html: String,
}

/// Retry and pacing parameters of a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first failed attempt
    pub max_retries: u32,
    /// The n-th retry waits `base_delay * n`
    pub base_delay: Duration,
    /// Applied after every successful fetch
    pub request_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            request_delay: Duration::from_millis(config.request_delay_ms),
        }
    }

    /// Backoff before retrying a failed attempt (`attempt` is 0-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay * (attempt + 1)
    }

    /// Total attempts, including the first
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

/// A way of turning a URL into page HTML
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name used in logs ("http", "browser")
    fn name(&self) -> &'static str;

    fn retry_policy(&self) -> &RetryPolicy;

    fn pacer(&self) -> &RequestPacer;

    /// One attempt, no retries
    async fn fetch_once(&self, url: &str) -> Result<RenderedPage, FetchError>;

    /// Fetches a page with bounded retries
    async fn fetch(&self, url: &str) -> Result<RenderedPage, FetchError> {
        fetch_with_retry(self, url).await
    }
}

/// Runs the retry loop of a transport
///
/// Attempts `1 + max_retries` times; any failure (connection error, timeout, non-2xx)
/// is retried after `base_delay * (attempt + 1)`.
///
/// # Returns
///
/// * `Ok(RenderedPage)` - The first successful attempt
/// * `Err(FetchError::RetriesExhausted)` - Every attempt failed
pub async fn fetch_with_retry<T: Transport + ?Sized>(
    transport: &T,
    url: &str,
) -> Result<RenderedPage, FetchError> {
    let policy = transport.retry_policy();
    let mut attempt = 0;

    loop {
        transport.pacer().acquire().await;

        match transport.fetch_once(url).await {
            Ok(page) => {
                debug!(url, status = page.status, transport = transport.name(), "Fetched page");
                if !policy.request_delay.is_zero() {
                    tokio::time::sleep(policy.request_delay).await;
                }
                return Ok(page);
            }
            Err(e) if attempt < policy.max_retries => {
                let backoff = policy.backoff(attempt);
                warn!(
                    url,
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Fetch failed, retrying"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(e) => {
                return Err(FetchError::RetriesExhausted {
                    url: url.to_string(),
                    attempts: attempt + 1,
                    last_error: Box::new(e),
                });
            }
        }
    }
}

/// Plain HTTP transport, no JavaScript execution
pub struct HttpTransport {
    /// Index 0 is the direct client, index `i + 1` goes through proxy `i`
    clients: Vec<Client>,
    rotation: RotationPool,
    accept_language: String,
    policy: RetryPolicy,
    pacer: Arc<RequestPacer>,
}

impl HttpTransport {
    /// Builds one client per configured proxy plus a direct one
    ///
    /// # Returns
    ///
    /// * `Ok(HttpTransport)` - Successfully built clients
    /// * `Err(reqwest::Error)` - Failed to build a client or parse a proxy
    pub fn new(
        crawler: &CrawlerConfig,
        transport: &TransportConfig,
        pacer: Arc<RequestPacer>,
    ) -> Result<Self, reqwest::Error> {
        let timeout = Duration::from_secs(crawler.timeout_secs);

        let mut clients = vec![build_http_client(timeout, None)?];
        for proxy in &transport.proxies {
            clients.push(build_http_client(timeout, Some(proxy))?);
        }

        Ok(Self {
            clients,
            rotation: RotationPool::new(transport.user_agents.clone(), transport.proxies.clone()),
            accept_language: transport.accept_language.clone(),
            policy: RetryPolicy::from_config(crawler),
            pacer,
        })
    }
}

/// Builds an HTTP client with the request timeout and optional proxy
pub fn build_http_client(timeout: Duration, proxy: Option<&str>) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true);

    if let Some(proxy) = proxy {
        builder = builder.proxy(Proxy::all(proxy)?);
    }

    builder.build()
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    fn retry_policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn pacer(&self) -> &RequestPacer {
        &self.pacer
    }

    async fn fetch_once(&self, url: &str) -> Result<RenderedPage, FetchError> {
        let identity = self.rotation.claim();
        let client = &self.clients[identity.proxy.map_or(0, |i| i + 1)];

        let response = client
            .get(url)
            .header(USER_AGENT, identity.user_agent)
            .header(ACCEPT, "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8")
            .header(ACCEPT_LANGUAGE, &self.accept_language)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let html = response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        Ok(RenderedPage {
            url: url.to_string(),
            status: status.as_u16(),
            html,
        })
    }
}
