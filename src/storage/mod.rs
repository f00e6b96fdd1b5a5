//! Storage module for persisting ingested records and crawl runs
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - Article and legal document persistence with uniqueness constraints
//! - Existence checks used to skip already-ingested records
//! - Crawl run auditing

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::crawler::DocStatus;
use chrono::{DateTime, NaiveDate, Utc};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Store handle shared between the coordinator and the ingestion gate
pub type SharedStorage = Arc<Mutex<dyn Storage + Send>>;

/// Opens (or creates) a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(StorageError)` - Failed to open or migrate the database
pub fn open_storage(path: &Path) -> StorageResult<SqliteStorage> {
    SqliteStorage::new(path)
}

/// Wraps a storage backend for sharing across tasks
pub fn shared<S: Storage + Send + 'static>(storage: S) -> SharedStorage {
    Arc::new(Mutex::new(storage))
}

/// Publication state of an article
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArticleStatus {
    Draft,
    Published,
}

impl ArticleStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "published" => Some(Self::Published),
            _ => None,
        }
    }
}

/// An article ready to be inserted
#[derive(Debug, Clone)]
pub struct NewArticle {
    pub title: String,
    pub slug: String,
    pub summary: String,
    pub content_html: String,
    pub source_url: String,
    pub source_name: String,
    pub image_url: Option<String>,
    pub tags: Vec<String>,
    pub has_disclaimer: bool,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub status: ArticleStatus,
    pub published_at: Option<DateTime<Utc>>,
    pub crawled_at: DateTime<Utc>,
}

/// A stored article
#[derive(Debug, Clone)]
pub struct ArticleRecord {
    pub id: i64,
    pub article: NewArticle,
    pub created_at: String,
}

/// A legal document ready to be inserted
#[derive(Debug, Clone)]
pub struct NewLegalDocument {
    pub doc_number: String,
    pub doc_type: String,
    pub title: String,
    pub issue_date: NaiveDate,
    pub effective_date: Option<NaiveDate>,
    pub signer: Option<String>,
    pub issuing_body: Option<String>,
    pub status: DocStatus,
    pub content_summary: Option<String>,
    pub content_full: Option<String>,
    pub original_link: String,
    pub pdf_url: Option<String>,
    pub tags: Vec<String>,
    pub key_changes: Vec<String>,
    pub crawled_at: DateTime<Utc>,
}

/// A stored legal document
#[derive(Debug, Clone)]
pub struct LegalDocumentRecord {
    pub id: i64,
    pub document: NewLegalDocument,
    pub created_at: String,
}
