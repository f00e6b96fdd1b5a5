//! Request pacing and identity rotation shared by every transport
//!
//! The `RequestPacer` spaces requests across all workers; the `RotationPool` hands out a
//! user agent and an optional proxy per request.

use rand::seq::IndexedRandom;
use rand::Rng;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Global rate budget: one unit per request, with a minimum spacing between any two requests
#[derive(Debug)]
pub struct RequestPacer {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
    issued: AtomicU64,
}

impl RequestPacer {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
            issued: AtomicU64::new(0),
        }
    }

    /// A pacer that never waits
    pub fn unthrottled() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Waits until a request may be issued, then claims the slot
    ///
    /// The lock is held across the sleep so that concurrent callers queue up behind each
    /// other instead of all waking at the same instant.
    pub async fn acquire(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + self.min_interval;
            let now = Instant::now();
            if ready_at > now {
                tokio::time::sleep(ready_at - now).await;
            }
        }
        *last = Some(Instant::now());
        self.issued.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of request slots claimed so far
    pub fn requests_issued(&self) -> u64 {
        self.issued.load(Ordering::Relaxed)
    }
}

/// One claimed identity for a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestIdentity {
    pub user_agent: String,
    /// Index into the pool's proxy list
    pub proxy: Option<usize>,
}

/// User agents picked at random, proxies rotated round-robin
#[derive(Debug)]
pub struct RotationPool {
    user_agents: Vec<String>,
    proxies: Vec<String>,
    next_proxy: AtomicUsize,
}

const FALLBACK_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

impl RotationPool {
    pub fn new(user_agents: Vec<String>, proxies: Vec<String>) -> Self {
        Self {
            user_agents,
            proxies,
            next_proxy: AtomicUsize::new(0),
        }
    }

    /// Claims a user agent and the next proxy in rotation
    pub fn claim(&self) -> RequestIdentity {
        let user_agent = self
            .user_agents
            .choose(&mut rand::rng())
            .map(String::as_str)
            .unwrap_or(FALLBACK_USER_AGENT)
            .to_string();

        let proxy = if self.proxies.is_empty() {
            None
        } else {
            Some(self.next_proxy.fetch_add(1, Ordering::Relaxed) % self.proxies.len())
        };

        RequestIdentity { user_agent, proxy }
    }

    pub fn proxies(&self) -> &[String] {
        &self.proxies
    }

    pub fn proxy_url(&self, index: usize) -> Option<&str> {
        self.proxies.get(index).map(String::as_str)
    }
}

/// Picks a random duration in `[min_ms, max_ms]`
pub fn random_delay(min_ms: u64, max_ms: u64) -> Duration {
    if max_ms <= min_ms {
        return Duration::from_millis(min_ms);
    }
    Duration::from_millis(rand::rng().random_range(min_ms..=max_ms))
}
