//! Per-source crawl orchestration
//!
//! A source is walked page by page: legal sources run every topic query over a page
//! range of their search endpoint, news sources read each category URL once. Every
//! page goes through extraction, the relevance filter and the run's deduplication set
//! before its detail page (if any) is fetched.

use crate::config::{PriorityPolicy, SourceConfig, SourceKind};
use crate::crawler::candidate::{CandidateDetails, DocStatus, RawCandidate};
use crate::crawler::dedup::DeduplicationSet;
use crate::crawler::fetcher::{FetchError, RenderedPage, Transport};
use crate::crawler::filter::RelevanceFilter;
use crate::crawler::parser::ExtractionStrategy;
use crate::url::build_search_url;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

/// Counts collected while walking one source
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceReport {
    pub source: String,
    pub pages_fetched: u32,
    pub pages_failed: u32,
    pub items_parsed: usize,
    pub dropped_irrelevant: usize,
    pub dropped_duplicate: usize,
    pub dropped_priority: usize,
    pub detail_failures: usize,
    pub accepted: usize,
}

/// What a source walk produced
#[derive(Debug, Clone)]
pub struct SourceOutcome {
    pub source: String,
    /// Accepted candidates in extraction order
    pub candidates: Vec<RawCandidate>,
    pub report: SourceReport,
    /// False when the walk was interrupted by cancellation
    pub completed: bool,
}

/// An ordered list of pages; an empty page ends the walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageWalk {
    pub label: String,
    pub pages: Vec<Url>,
}

enum Step<T> {
    Done(T),
    Cancelled,
}

/// Drives one source from its first page to a stop condition
pub struct SourceOrchestrator {
    source: SourceConfig,
    strategy: Arc<ExtractionStrategy>,
    transport: Arc<dyn Transport>,
    filter: Option<Arc<RelevanceFilter>>,
    cancel: CancellationToken,
}

impl SourceOrchestrator {
    /// Creates an orchestrator; the filter is only applied if the source enables it
    pub fn new(
        source: SourceConfig,
        strategy: Arc<ExtractionStrategy>,
        transport: Arc<dyn Transport>,
        filter: Option<Arc<RelevanceFilter>>,
        cancel: CancellationToken,
    ) -> Self {
        let filter = if source.filter_enabled() { filter } else { None };
        Self {
            source,
            strategy,
            transport,
            filter,
            cancel,
        }
    }

    pub fn source_name(&self) -> &str {
        &self.source.name
    }

    /// Lists the page walks of this source
    ///
    /// Unparseable target URLs are logged and left out.
    pub fn plan(&self) -> Vec<PageWalk> {
        let mut walks = Vec::new();

        for target in &self.source.targets {
            let target_url = match Url::parse(target) {
                Ok(url) => url,
                Err(e) => {
                    warn!(source = %self.source.name, target, error = %e, "Skipping invalid target URL");
                    continue;
                }
            };

            match self.source.kind {
                SourceKind::Legal => {
                    let max_queries = self
                        .source
                        .max_queries
                        .map_or(self.source.queries.len(), |m| m as usize);
                    for query in self.source.queries.iter().take(max_queries) {
                        walks.push(PageWalk {
                            label: query.clone(),
                            pages: (1..=self.source.max_pages)
                                .map(|page| build_search_url(&target_url, query, page))
                                .collect(),
                        });
                    }
                }
                SourceKind::News => walks.push(PageWalk {
                    label: target.clone(),
                    pages: vec![target_url],
                }),
            }
        }

        walks
    }

    fn item_cap_reached(&self, accepted: usize) -> bool {
        self.source
            .max_items
            .is_some_and(|max| accepted >= max as usize)
    }

    async fn fetch_page(&self, url: &str) -> Step<Result<RenderedPage, FetchError>> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Step::Cancelled,
            result = self.transport.fetch(url) => Step::Done(result),
        }
    }

    async fn enrich(&self, candidate: &mut RawCandidate) -> Step<Result<(), FetchError>> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Step::Cancelled,
            result = self.strategy.enrich_with_detail(self.transport.as_ref(), candidate) => Step::Done(result),
        }
    }

    /// Walks the source, accepting candidates into `dedup`
    ///
    /// Never fails: fetch errors end up in the report and the walk moves on to the next
    /// page. Cancellation stops at the next fetch and returns what was accepted so far.
    pub async fn run(&self, dedup: &mut DeduplicationSet) -> SourceOutcome {
        let name = self.source.name.clone();
        let mut report = SourceReport {
            source: name.clone(),
            ..SourceReport::default()
        };
        let mut candidates: Vec<RawCandidate> = Vec::new();
        let mut completed = true;

        info!(source = %name, transport = self.transport.name(), "Starting source");

        'walks: for walk in self.plan() {
            for (index, url) in walk.pages.iter().enumerate() {
                if self.cancel.is_cancelled() {
                    completed = false;
                    break 'walks;
                }

                let page = match self.fetch_page(url.as_str()).await {
                    Step::Cancelled => {
                        completed = false;
                        break 'walks;
                    }
                    Step::Done(Ok(page)) => page,
                    Step::Done(Err(e)) => {
                        warn!(source = %name, walk = %walk.label, url = %url, error = %e, "Page fetch failed, moving on");
                        report.pages_failed += 1;
                        continue;
                    }
                };
                report.pages_fetched += 1;

                let extracted = self.strategy.extract(&page);
                if extracted.is_empty() {
                    info!(source = %name, walk = %walk.label, page = index + 1, "No items found, end of results");
                    continue 'walks;
                }
                report.items_parsed += extracted.len();
                debug!(source = %name, url = %url, items = extracted.len(), "Extracted items");

                for mut candidate in extracted {
                    if let Some(filter) = &self.filter {
                        if !filter.is_relevant(&candidate) {
                            report.dropped_irrelevant += 1;
                            continue;
                        }
                    }

                    if !dedup.accept(&candidate) {
                        report.dropped_duplicate += 1;
                        continue;
                    }

                    if self.strategy.needs_detail(&candidate) {
                        match self.enrich(&mut candidate).await {
                            Step::Cancelled => {
                                candidates.push(candidate);
                                completed = false;
                                break 'walks;
                            }
                            Step::Done(Err(e)) => {
                                warn!(source = %name, link = %candidate.link, error = %e, "Detail fetch failed, keeping listing data");
                                report.detail_failures += 1;
                            }
                            Step::Done(Ok(())) => {}
                        }
                    }

                    candidates.push(candidate);
                    if self.item_cap_reached(candidates.len()) {
                        info!(source = %name, max_items = candidates.len(), "Item cap reached");
                        break 'walks;
                    }
                }
            }
        }

        let before = candidates.len();
        let candidates = apply_priority_policy(
            candidates,
            self.source.priority_policy,
            &self.source.priority_doc_types,
        );
        report.dropped_priority = before - candidates.len();
        report.accepted = candidates.len();

        info!(
            source = %name,
            pages_fetched = report.pages_fetched,
            pages_failed = report.pages_failed,
            parsed = report.items_parsed,
            irrelevant = report.dropped_irrelevant,
            duplicates = report.dropped_duplicate,
            accepted = report.accepted,
            completed,
            "Source finished"
        );

        SourceOutcome {
            source: name,
            candidates,
            report,
            completed,
        }
    }
}

/// Narrows legal candidates to priority document types
///
/// `Strict` keeps documents whose type contains one of `priority_types`, plus documents
/// still in force. `FallbackToAll` does the same but keeps everything when nothing
/// matches. News candidates always pass.
pub fn apply_priority_policy(
    candidates: Vec<RawCandidate>,
    policy: PriorityPolicy,
    priority_types: &[String],
) -> Vec<RawCandidate> {
    if policy == PriorityPolicy::KeepAll || priority_types.is_empty() {
        return candidates;
    }

    let is_priority = |candidate: &RawCandidate| match &candidate.details {
        CandidateDetails::Legal(fields) => {
            let doc_type = fields.doc_type.as_deref().unwrap_or_default().to_lowercase();
            priority_types
                .iter()
                .any(|t| doc_type.contains(&t.to_lowercase()))
                || fields.status == DocStatus::Active
        }
        CandidateDetails::News(_) => true,
    };

    if policy == PriorityPolicy::FallbackToAll && !candidates.iter().any(is_priority) {
        return candidates;
    }

    candidates.into_iter().filter(|c| is_priority(c)).collect()
}
