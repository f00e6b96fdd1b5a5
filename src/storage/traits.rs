//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::state::{CrawlRun, CrawlType, RunStatus};
use crate::storage::{ArticleRecord, LegalDocumentRecord, NewArticle, NewLegalDocument};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Run has no id; it was never inserted")]
    UnsavedRun,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Writes take `&mut self`; callers share a backend through
/// [`SharedStorage`](crate::storage::SharedStorage).
pub trait Storage {
    // ===== Run Management =====

    /// Inserts a crawl run and returns its id
    fn insert_crawl_run(&mut self, run: &CrawlRun) -> StorageResult<i64>;

    /// Writes the run's status, counts and completion time
    ///
    /// Fails with `UnsavedRun` if the run has no id.
    fn update_crawl_run(&mut self, run: &CrawlRun) -> StorageResult<()>;

    /// Gets a run by ID
    fn get_crawl_run(&self, run_id: i64) -> StorageResult<CrawlRun>;

    /// Most recent runs first
    fn latest_runs(&self, limit: usize) -> StorageResult<Vec<CrawlRun>>;

    /// Counts runs in a given status
    fn count_runs_by_status(&self, status: RunStatus) -> StorageResult<u64>;

    // ===== Records =====

    /// Returns true if a record with this identity key was already ingested
    ///
    /// The key is the source URL for news and the document number for legal documents.
    fn exists_by_identity_key(&self, kind: CrawlType, key: &str) -> StorageResult<bool>;

    /// Inserts an article; a duplicate `source_url` is a `ConstraintViolation`
    fn insert_article(&mut self, article: &NewArticle) -> StorageResult<i64>;

    /// Inserts a legal document; a duplicate `doc_number` is a `ConstraintViolation`
    fn insert_legal_document(&mut self, document: &NewLegalDocument) -> StorageResult<i64>;

    fn get_article_by_url(&self, source_url: &str) -> StorageResult<Option<ArticleRecord>>;

    fn get_legal_document(&self, doc_number: &str) -> StorageResult<Option<LegalDocumentRecord>>;

    // ===== Statistics =====

    fn count_articles(&self) -> StorageResult<u64>;

    fn count_legal_documents(&self) -> StorageResult<u64>;
}
