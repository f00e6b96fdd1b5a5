//! Statistics generation from the ingestion database
//!
//! This module provides functionality for extracting and displaying
//! run history and entity counts from the storage layer.

use crate::crawler::CrawlRunResult;
use crate::state::{CrawlRun, RunStatus};
use crate::storage::Storage;
use crate::WatchError;
use std::collections::HashMap;

/// Number of recent runs listed by `--stats`
pub const RECENT_RUNS: usize = 10;

/// Ingestion statistics summary
#[derive(Debug, Clone)]
pub struct IngestStatistics {
    pub articles: u64,
    pub legal_documents: u64,

    /// Count of runs by status
    pub runs_by_status: HashMap<RunStatus, u64>,

    /// Most recent runs first
    pub recent_runs: Vec<CrawlRun>,
}

impl IngestStatistics {
    pub fn total_runs(&self) -> u64 {
        self.runs_by_status.values().sum()
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
/// * `recent` - How many recent runs to include
///
/// # Returns
///
/// * `Ok(IngestStatistics)` - Successfully loaded statistics
/// * `Err(WatchError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage, recent: usize) -> Result<IngestStatistics, WatchError> {
    let mut runs_by_status = HashMap::new();
    for status in RunStatus::all_statuses() {
        let count = storage.count_runs_by_status(status)?;
        if count > 0 {
            runs_by_status.insert(status, count);
        }
    }

    Ok(IngestStatistics {
        articles: storage.count_articles()?,
        legal_documents: storage.count_legal_documents()?,
        runs_by_status,
        recent_runs: storage.latest_runs(recent)?,
    })
}

/// One line describing a run
pub fn format_run_line(run: &CrawlRun) -> String {
    let id = run.id.map_or_else(|| "-".to_string(), |id| id.to_string());
    let duration = run
        .duration()
        .map(|d| format!("{}s", d.num_seconds()))
        .unwrap_or_else(|| "running".to_string());
    let mut line = format!(
        "#{} {} {} [{}] found={} processed={} skipped={} ({})",
        id,
        run.started_at.format("%Y-%m-%d %H:%M"),
        run.crawl_type,
        run.source,
        run.items_found,
        run.items_processed,
        run.items_skipped,
        duration
    );
    match run.status {
        RunStatus::Completed if run.partial => line.push_str(" partial"),
        RunStatus::Completed => {}
        status => line.push_str(&format!(" {}", status)),
    }
    if let Some(error) = &run.error_message {
        line.push_str(&format!(": {}", error));
    }
    line
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &IngestStatistics) {
    println!("=== Ingestion Statistics ===\n");

    println!("Stored records:");
    println!("  Articles: {}", stats.articles);
    println!("  Legal documents: {}", stats.legal_documents);
    println!();

    println!("Runs ({} total):", stats.total_runs());
    let mut status_counts: Vec<_> = stats.runs_by_status.iter().collect();
    status_counts.sort_by(|a, b| b.1.cmp(a.1));
    for (status, count) in status_counts {
        println!("  {}: {}", status, count);
    }
    println!();

    if !stats.recent_runs.is_empty() {
        println!("Recent runs:");
        for run in &stats.recent_runs {
            println!("  {}", format_run_line(run));
        }
    }
}

/// Prints the outcome of a finished run
pub fn print_run_result(result: &CrawlRunResult) {
    println!("{}", format_run_line(&result.run));
    for report in &result.reports {
        println!(
            "  {}: pages {} ok / {} failed, parsed {}, irrelevant {}, duplicate {}, accepted {}",
            report.source,
            report.pages_fetched,
            report.pages_failed,
            report.items_parsed,
            report.dropped_irrelevant,
            report.dropped_duplicate,
            report.accepted
        );
    }
    if result.ingest.failed > 0 {
        println!("  {} records failed to store", result.ingest.failed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::CrawlType;

    #[test]
    fn test_total_runs() {
        let mut runs_by_status = HashMap::new();
        runs_by_status.insert(RunStatus::Completed, 4);
        runs_by_status.insert(RunStatus::Failed, 1);

        let stats = IngestStatistics {
            articles: 10,
            legal_documents: 3,
            runs_by_status,
            recent_runs: vec![],
        };
        assert_eq!(stats.total_runs(), 5);
    }

    #[test]
    fn test_format_run_line() {
        let mut run = CrawlRun::start("multi", CrawlType::NewsArticles, "h");
        run.id = Some(7);
        run.partial = true;
        run.complete(5, 3).unwrap();

        let line = format_run_line(&run);
        assert!(line.starts_with("#7 "));
        assert!(line.contains("found=5 processed=3"));
        assert!(line.ends_with("partial"));

        let mut failed = CrawlRun::start("tvpl", CrawlType::LegalDocs, "h");
        failed.fail("Ingestion failed").unwrap();
        assert!(format_run_line(&failed).ends_with("failed: Ingestion failed"));
    }
}
