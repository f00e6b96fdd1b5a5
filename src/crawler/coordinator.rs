//! Run coordinator - crawl run lifecycle and source dispatch
//!
//! This module ties a crawl run together:
//! - Recording the run before any fetch and finalizing it exactly once
//! - Dispatching one orchestration task per source under a concurrency bound
//! - Enforcing the run timeout and honoring external cancellation
//! - Merging per-source shards and handing the result to the ingestion gate

use crate::config::{CrawlerConfig, SourceConfig};
use crate::crawler::dedup::DeduplicationSet;
use crate::crawler::fetcher::Transport;
use crate::crawler::filter::RelevanceFilter;
use crate::crawler::orchestrator::{SourceOrchestrator, SourceOutcome, SourceReport};
use crate::crawler::pacing::random_delay;
use crate::crawler::parser::ExtractionStrategy;
use crate::crawler::registry::{SourceOverrides, SourceRegistry};
use crate::crawler::RawCandidate;
use crate::ingest::{IngestReport, IngestionGate};
use crate::state::{CrawlRun, CrawlType};
use crate::storage::{SharedStorage, StorageError};
use crate::WatchError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Label recorded on runs spanning more than one source
pub const MULTI_SOURCE: &str = "multi";

/// Dispatch settings of the coordinator
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub max_concurrent_sources: usize,
    pub inter_source_delay_min_ms: u64,
    pub inter_source_delay_max_ms: u64,
    pub run_timeout: Duration,
}

impl CoordinatorSettings {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            max_concurrent_sources: config.max_concurrent_sources.max(1) as usize,
            inter_source_delay_min_ms: config.inter_source_delay_min_ms,
            inter_source_delay_max_ms: config.inter_source_delay_max_ms,
            run_timeout: Duration::from_secs(config.run_timeout_secs),
        }
    }
}

/// The finalized run with what each source reported
#[derive(Debug, Clone)]
pub struct CrawlRunResult {
    pub run: CrawlRun,
    /// Per-source reports in configuration order; sources never dispatched are absent
    pub reports: Vec<SourceReport>,
    pub ingest: IngestReport,
}

/// Drives crawl runs from dispatch to the terminal CrawlRun record
pub struct RunCoordinator {
    storage: SharedStorage,
    transport: Arc<dyn Transport>,
    gate: Arc<IngestionGate>,
    filter: Option<Arc<RelevanceFilter>>,
    settings: CoordinatorSettings,
    config_hash: String,
}

impl RunCoordinator {
    pub fn new(
        storage: SharedStorage,
        transport: Arc<dyn Transport>,
        gate: Arc<IngestionGate>,
        filter: Option<Arc<RelevanceFilter>>,
        settings: CoordinatorSettings,
        config_hash: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            transport,
            gate,
            filter,
            settings,
            config_hash: config_hash.into(),
        }
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    /// Runs one crawl type over the registry's matching sources
    pub async fn run_type(
        &self,
        crawl_type: CrawlType,
        registry: &SourceRegistry,
        overrides: &SourceOverrides,
        cancel: &CancellationToken,
    ) -> Result<CrawlRunResult, WatchError> {
        let sources = registry.strategies(crawl_type, overrides)?;
        self.run_pipeline(crawl_type, sources, self.settings.max_concurrent_sources, cancel)
            .await
    }

    /// Runs legal documents then news, each as its own CrawlRun
    ///
    /// A failure of one run does not prevent the other.
    pub async fn run_full(
        &self,
        registry: &SourceRegistry,
        overrides: &SourceOverrides,
        cancel: &CancellationToken,
    ) -> Vec<(CrawlType, Result<CrawlRunResult, WatchError>)> {
        let mut results = Vec::new();
        for crawl_type in [CrawlType::LegalDocs, CrawlType::NewsArticles] {
            if cancel.is_cancelled() {
                tracing::warn!(crawl_type = %crawl_type, "Cancelled before start, skipping");
                results.push((crawl_type, Err(WatchError::Cancelled)));
                continue;
            }
            let result = self.run_type(crawl_type, registry, overrides, cancel).await;
            if let Err(e) = &result {
                tracing::error!(crawl_type = %crawl_type, error = %e, "Crawl run failed");
            }
            results.push((crawl_type, result));
        }
        results
    }

    fn record_new_run(&self, run: &CrawlRun) -> Result<i64, WatchError> {
        let mut storage = self.storage.lock().map_err(|_| StorageError::LockPoisoned)?;
        Ok(storage.insert_crawl_run(run)?)
    }

    fn record_final_run(&self, run: &CrawlRun) -> Result<(), WatchError> {
        let mut storage = self.storage.lock().map_err(|_| StorageError::LockPoisoned)?;
        Ok(storage.update_crawl_run(run)?)
    }

    /// Crawls the given sources concurrently and ingests what they found
    ///
    /// The run is inserted in `Started` before any fetch. If that insert fails the error
    /// is returned and no record exists. Otherwise the run always reaches a terminal
    /// state: `Completed` (possibly `partial` after a timeout or cancellation) or `Failed`
    /// when ingestion breaks or nothing completed before cancellation.
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlRunResult)` - The run reached a terminal state and was recorded
    /// * `Err(WatchError)` - The run could not be created or finalized in the store
    pub async fn run_pipeline(
        &self,
        crawl_type: CrawlType,
        sources: Vec<(SourceConfig, Arc<ExtractionStrategy>)>,
        concurrency: usize,
        cancel: &CancellationToken,
    ) -> Result<CrawlRunResult, WatchError> {
        let label = match sources.as_slice() {
            [(only, _)] => only.name.clone(),
            _ => MULTI_SOURCE.to_string(),
        };

        let mut run = CrawlRun::start(&label, crawl_type, &self.config_hash);
        run.id = Some(self.record_new_run(&run)?);
        tracing::info!(
            run_id = ?run.id,
            crawl_type = %crawl_type,
            source = %label,
            sources = sources.len(),
            "Crawl run started"
        );

        let run_cancel = cancel.child_token();
        let watchdog = {
            let token = run_cancel.clone();
            let timeout = self.settings.run_timeout;
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(timeout) => {
                        tracing::warn!(timeout_secs = timeout.as_secs(), "Run timeout reached, cancelling sources");
                        token.cancel();
                    }
                    _ = token.cancelled() => {}
                }
            })
        };

        let outcomes = self.dispatch(sources, concurrency, &run_cancel).await;
        watchdog.abort();
        let interrupted = was_interrupted(&outcomes);

        let mut sources_failed = 0u32;
        let mut any_completed = false;
        let mut reports = Vec::new();
        let mut shards = Vec::new();
        for outcome in outcomes {
            match outcome {
                Dispatch::Finished(outcome) => {
                    let report = &outcome.report;
                    if report.pages_fetched == 0 && report.pages_failed > 0 {
                        tracing::warn!(source = %outcome.source, "Every page of the source failed");
                        sources_failed += 1;
                    }
                    any_completed |= outcome.completed;
                    reports.push(outcome.report.clone());
                    shards.push(outcome);
                }
                Dispatch::Panicked(source) => {
                    tracing::error!(source = %source, "Source task ended abnormally");
                    sources_failed += 1;
                }
                Dispatch::NotStarted(source) => {
                    tracing::info!(source = %source, "Source not started before cancellation");
                }
            }
        }

        let candidates = merge_shards(shards);
        run.sources_failed = sources_failed;
        run.items_found = candidates.len() as u64;

        let mut ingest = IngestReport::default();
        let finalized = if interrupted && !any_completed {
            run.fail("Cancelled before any source completed")
        } else {
            match self.gate.ingest(&candidates, crawl_type).await {
                Ok(report) => {
                    ingest = report;
                    run.items_skipped = report.skipped;
                    run.partial = interrupted;
                    match run.complete(candidates.len() as u64, report.processed) {
                        Ok(()) => Ok(()),
                        Err(e) => run.fail(e.to_string()),
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Ingestion failed");
                    run.fail(format!("Ingestion failed: {}", e))
                }
            }
        };
        finalized?;

        self.record_final_run(&run)?;

        tracing::info!(
            run_id = ?run.id,
            status = %run.status,
            partial = run.partial,
            found = run.items_found,
            processed = run.items_processed,
            skipped = run.items_skipped,
            sources_failed = run.sources_failed,
            "Crawl run finished"
        );

        Ok(CrawlRunResult {
            run,
            reports,
            ingest,
        })
    }

    /// Runs one task per source and returns their outcomes in configuration order
    async fn dispatch(
        &self,
        sources: Vec<(SourceConfig, Arc<ExtractionStrategy>)>,
        concurrency: usize,
        cancel: &CancellationToken,
    ) -> Vec<Dispatch> {
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let mut tasks = JoinSet::new();
        let mut slots: Vec<Dispatch> = sources
            .iter()
            .map(|(source, _)| Dispatch::NotStarted(source.name.clone()))
            .collect();

        for (index, (source, strategy)) in sources.into_iter().enumerate() {
            if index > 0 {
                let delay = random_delay(
                    self.settings.inter_source_delay_min_ms,
                    self.settings.inter_source_delay_max_ms,
                );
                let cancelled = tokio::select! {
                    _ = cancel.cancelled() => true,
                    _ = tokio::time::sleep(delay) => false,
                };
                if cancelled {
                    break;
                }
            }

            let permit = tokio::select! {
                _ = cancel.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                break;
            };

            tracing::debug!(source = %source.name, "Dispatching source");
            slots[index] = Dispatch::Panicked(source.name.clone());
            let orchestrator = SourceOrchestrator::new(
                source,
                strategy,
                self.transport.clone(),
                self.filter.clone(),
                cancel.clone(),
            );
            tasks.spawn(async move {
                let mut dedup = DeduplicationSet::new();
                let outcome = orchestrator.run(&mut dedup).await;
                drop(permit);
                (index, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => slots[index] = Dispatch::Finished(outcome),
                // The slot keeps its Panicked marker
                Err(e) => tracing::error!(error = %e, "Source task failed to join"),
            }
        }

        slots
    }
}

enum Dispatch {
    Finished(SourceOutcome),
    /// Spawned but never reported back
    Panicked(String),
    NotStarted(String),
}

/// Returns true if a source was cut short or never started
fn was_interrupted(outcomes: &[Dispatch]) -> bool {
    outcomes.iter().any(|outcome| match outcome {
        Dispatch::Finished(outcome) => !outcome.completed,
        Dispatch::NotStarted(_) => true,
        Dispatch::Panicked(_) => false,
    })
}

/// Concatenates source shards, dropping keys already accepted from an earlier shard
pub fn merge_shards(shards: Vec<SourceOutcome>) -> Vec<RawCandidate> {
    let mut seen = DeduplicationSet::new();
    let mut merged = Vec::new();
    for shard in shards {
        for candidate in shard.candidates {
            if seen.accept(&candidate) {
                merged.push(candidate);
            } else {
                tracing::debug!(
                    source = %shard.source,
                    key = %candidate.identity_key,
                    "Dropping key already found by an earlier source"
                );
            }
        }
    }
    merged
}
