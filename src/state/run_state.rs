/// Run status and crawl type definitions
///
/// A crawl run starts in `Started` and moves exactly once to a terminal state.
use std::fmt;

/// Lifecycle status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunStatus {
    // ===== Active States =====
    /// Run record inserted, sources are being crawled
    Started,

    // ===== Terminal States =====
    /// Run finished; counts are final (possibly partial)
    Completed,

    /// Run aborted by a coordinator-level fault or cancelled before any source finished
    Failed,
}

impl RunStatus {
    /// Returns true if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns true if a run may move from `self` to `next`
    ///
    /// The only legal transitions are `Started -> Completed` and `Started -> Failed`.
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        matches!(self, Self::Started) && next.is_terminal()
    }

    /// Converts the status to a database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parses a status from a database string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "started" => Some(Self::Started),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns all possible run statuses
    pub fn all_statuses() -> Vec<Self> {
        vec![Self::Started, Self::Completed, Self::Failed]
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// What a crawl run ingests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlType {
    LegalDocs,
    NewsArticles,
}

impl CrawlType {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::LegalDocs => "legal_docs",
            Self::NewsArticles => "news_articles",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "legal_docs" => Some(Self::LegalDocs),
            "news_articles" => Some(Self::NewsArticles),
            _ => None,
        }
    }
}

impl fmt::Display for CrawlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
