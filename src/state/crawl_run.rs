use crate::state::{CrawlType, RunStatus};
use crate::WatchError;
use chrono::{DateTime, Utc};

/// Audit record of one orchestration invocation
///
/// Inserted in `Started` before any fetch and mutated once, at the terminal transition.
/// `completed_at` is set exactly when the status is terminal, and `items_processed`
/// never exceeds `items_found`.
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlRun {
    /// Store-assigned identifier; `None` until the run is inserted
    pub id: Option<i64>,

    /// Source identifier, or `"multi"` when several sources ran together
    pub source: String,

    pub crawl_type: CrawlType,
    pub status: RunStatus,

    /// Unique candidates handed to ingestion
    pub items_found: u64,

    /// Candidates persisted by this run
    pub items_processed: u64,

    /// Candidates already present in the store
    pub items_skipped: u64,

    /// Sources whose orchestration ended in error
    pub sources_failed: u32,

    /// Run was cancelled or timed out and finalized with what it had
    pub partial: bool,

    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,

    /// SHA-256 of the configuration file that produced this run
    pub config_hash: String,
}

impl CrawlRun {
    /// Creates a new run in the `Started` state
    pub fn start(source: &str, crawl_type: CrawlType, config_hash: &str) -> Self {
        Self {
            id: None,
            source: source.to_string(),
            crawl_type,
            status: RunStatus::Started,
            items_found: 0,
            items_processed: 0,
            items_skipped: 0,
            sources_failed: 0,
            partial: false,
            error_message: None,
            started_at: Utc::now(),
            completed_at: None,
            config_hash: config_hash.to_string(),
        }
    }

    /// Moves the run to `Completed` with its final counts
    ///
    /// # Returns
    ///
    /// * `Err(WatchError::InvalidTransition)` - The run is already terminal
    /// * `Err(WatchError::CountInvariant)` - More items processed than found
    pub fn complete(&mut self, items_found: u64, items_processed: u64) -> Result<(), WatchError> {
        if items_processed > items_found {
            return Err(WatchError::CountInvariant {
                found: items_found,
                processed: items_processed,
            });
        }
        self.transition(RunStatus::Completed)?;
        self.items_found = items_found;
        self.items_processed = items_processed;
        Ok(())
    }

    /// Moves the run to `Failed`, keeping whatever counts were recorded so far
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), WatchError> {
        self.transition(RunStatus::Failed)?;
        self.error_message = Some(message.into());
        Ok(())
    }

    fn transition(&mut self, next: RunStatus) -> Result<(), WatchError> {
        if !self.status.can_transition_to(next) {
            return Err(WatchError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Returns true once the run has reached `Completed` or `Failed`
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Wall-clock duration, if the run has finished
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.completed_at.map(|end| end - self.started_at)
    }
}
