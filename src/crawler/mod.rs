//! Crawler module for fetching, extracting and coordinating sources
//!
//! This module contains the core crawling logic, including:
//! - Page transports (plain HTTP and a remote browser) with retry and pacing
//! - Declarative extraction of candidates from listing and detail pages
//! - Relevance filtering and in-run deduplication
//! - Per-source orchestration and run coordination

mod browser;
mod candidate;
mod coordinator;
mod dedup;
mod fetcher;
mod filter;
mod orchestrator;
mod pacing;
mod parser;
mod registry;

pub use browser::BrowserTransport;
pub use candidate::{CandidateDetails, DocStatus, LegalFields, NewsFields, RawCandidate};
pub use coordinator::{merge_shards, CoordinatorSettings, CrawlRunResult, RunCoordinator, MULTI_SOURCE};
pub use dedup::{canonical_doc_number, DeduplicationSet};
pub use fetcher::{
    build_http_client, fetch_with_retry, FetchError, HttpTransport, RenderedPage, RetryPolicy,
    Transport,
};
pub use filter::RelevanceFilter;
pub use orchestrator::{apply_priority_policy, PageWalk, SourceOrchestrator, SourceOutcome, SourceReport};
pub use pacing::{random_delay, RequestIdentity, RequestPacer, RotationPool};
pub use parser::{clean_html_content, infer_doc_type, parse_vietnamese_date, ExtractionStrategy};
pub use registry::{kind_for, SourceOverrides, SourceRegistry};

use crate::config::{Config, RendererKind};
use crate::WatchError;
use std::sync::Arc;
use std::time::Duration;

/// Builds the transport selected by configuration
///
/// `force_http` replaces a configured browser renderer with plain HTTP. Both transports
/// share one request pacer.
///
/// # Arguments
///
/// * `config` - The loaded configuration
/// * `force_http` - Ignore `[transport] renderer = "browser"`
///
/// # Returns
///
/// * `Ok(Arc<dyn Transport>)` - Transport ready to use
/// * `Err(WatchError)` - Failed to build the HTTP client or reach the browser settings
pub fn build_transport(config: &Config, force_http: bool) -> Result<Arc<dyn Transport>, WatchError> {
    let pacer = Arc::new(RequestPacer::new(Duration::from_millis(
        config.crawler.min_request_interval_ms,
    )));

    let renderer = if force_http {
        RendererKind::Http
    } else {
        config.transport.renderer
    };

    let transport: Arc<dyn Transport> = match renderer {
        RendererKind::Http => Arc::new(HttpTransport::new(
            &config.crawler,
            &config.transport,
            pacer,
        )?),
        RendererKind::Browser => Arc::new(BrowserTransport::new(
            &config.crawler,
            &config.transport,
            pacer,
        )?),
    };

    tracing::info!(transport = transport.name(), "Transport ready");
    Ok(transport)
}

/// Builds the shared keyword filter, if any keywords are configured
pub fn build_filter(config: &Config) -> Option<Arc<RelevanceFilter>> {
    let filter = RelevanceFilter::new(&config.filter.keywords);
    (!filter.keywords().is_empty()).then(|| Arc::new(filter))
}
