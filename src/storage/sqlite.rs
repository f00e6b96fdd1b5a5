//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::crawler::DocStatus;
use crate::state::{CrawlRun, CrawlType, RunStatus};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{
    ArticleRecord, ArticleStatus, LegalDocumentRecord, NewArticle, NewLegalDocument,
};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::path::Path;

const DATE_FORMAT: &str = "%Y-%m-%d";

const RUN_COLUMNS: &str = "id, source, crawl_type, status, items_found, items_processed,
     items_skipped, sources_failed, partial, error_message, config_hash, started_at, completed_at";

const ARTICLE_COLUMNS: &str = "id, title, slug, summary, content_html, source_url, source_name,
     image_url, tags, has_disclaimer, meta_title, meta_description, status, published_at,
     crawled_at, created_at";

const LEGAL_COLUMNS: &str = "id, doc_number, doc_type, title, issue_date, effective_date, signer,
     issuing_body, status, content_summary, content_full, original_link, pdf_url, tags,
     key_changes, crawled_at, created_at";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

/// Turns a UNIQUE/CHECK failure into `ConstraintViolation`
fn map_write_error(err: rusqlite::Error) -> StorageError {
    match &err {
        rusqlite::Error::SqliteFailure(code, message)
            if code.code == ErrorCode::ConstraintViolation =>
        {
            StorageError::ConstraintViolation(
                message.clone().unwrap_or_else(|| code.to_string()),
            )
        }
        _ => StorageError::Sqlite(err),
    }
}

fn parse_timestamp(value: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Serialization(format!("Bad timestamp '{}': {}", value, e)))
}

fn parse_date(value: &str) -> StorageResult<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|e| StorageError::Serialization(format!("Bad date '{}': {}", value, e)))
}

fn encode_list(values: &[String]) -> StorageResult<String> {
    serde_json::to_string(values).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn decode_list(value: &str) -> StorageResult<Vec<String>> {
    serde_json::from_str(value).map_err(|e| StorageError::Serialization(e.to_string()))
}

/// Crawl run columns as stored, converted after the row is read
struct RunRow {
    id: i64,
    source: String,
    crawl_type: String,
    status: String,
    items_found: i64,
    items_processed: i64,
    items_skipped: i64,
    sources_failed: i64,
    partial: bool,
    error_message: Option<String>,
    config_hash: String,
    started_at: String,
    completed_at: Option<String>,
}

impl RunRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            source: row.get(1)?,
            crawl_type: row.get(2)?,
            status: row.get(3)?,
            items_found: row.get(4)?,
            items_processed: row.get(5)?,
            items_skipped: row.get(6)?,
            sources_failed: row.get(7)?,
            partial: row.get(8)?,
            error_message: row.get(9)?,
            config_hash: row.get(10)?,
            started_at: row.get(11)?,
            completed_at: row.get(12)?,
        })
    }

    fn into_run(self) -> StorageResult<CrawlRun> {
        let crawl_type = CrawlType::from_db_string(&self.crawl_type).ok_or_else(|| {
            StorageError::Serialization(format!("Unknown crawl type '{}'", self.crawl_type))
        })?;
        let status = RunStatus::from_db_string(&self.status).ok_or_else(|| {
            StorageError::Serialization(format!("Unknown run status '{}'", self.status))
        })?;

        Ok(CrawlRun {
            id: Some(self.id),
            source: self.source,
            crawl_type,
            status,
            items_found: self.items_found.max(0) as u64,
            items_processed: self.items_processed.max(0) as u64,
            items_skipped: self.items_skipped.max(0) as u64,
            sources_failed: self.sources_failed.max(0) as u32,
            partial: self.partial,
            error_message: self.error_message,
            started_at: parse_timestamp(&self.started_at)?,
            completed_at: self.completed_at.as_deref().map(parse_timestamp).transpose()?,
            config_hash: self.config_hash,
        })
    }
}

struct ArticleRow {
    id: i64,
    title: String,
    slug: String,
    summary: String,
    content_html: String,
    source_url: String,
    source_name: String,
    image_url: Option<String>,
    tags: String,
    has_disclaimer: bool,
    meta_title: Option<String>,
    meta_description: Option<String>,
    status: String,
    published_at: Option<String>,
    crawled_at: String,
    created_at: String,
}

impl ArticleRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            slug: row.get(2)?,
            summary: row.get(3)?,
            content_html: row.get(4)?,
            source_url: row.get(5)?,
            source_name: row.get(6)?,
            image_url: row.get(7)?,
            tags: row.get(8)?,
            has_disclaimer: row.get(9)?,
            meta_title: row.get(10)?,
            meta_description: row.get(11)?,
            status: row.get(12)?,
            published_at: row.get(13)?,
            crawled_at: row.get(14)?,
            created_at: row.get(15)?,
        })
    }

    fn into_record(self) -> StorageResult<ArticleRecord> {
        Ok(ArticleRecord {
            id: self.id,
            article: NewArticle {
                title: self.title,
                slug: self.slug,
                summary: self.summary,
                content_html: self.content_html,
                source_url: self.source_url,
                source_name: self.source_name,
                image_url: self.image_url,
                tags: decode_list(&self.tags)?,
                has_disclaimer: self.has_disclaimer,
                meta_title: self.meta_title,
                meta_description: self.meta_description,
                status: ArticleStatus::from_db_string(&self.status)
                    .unwrap_or(ArticleStatus::Draft),
                published_at: self.published_at.as_deref().map(parse_timestamp).transpose()?,
                crawled_at: parse_timestamp(&self.crawled_at)?,
            },
            created_at: self.created_at,
        })
    }
}

struct LegalRow {
    id: i64,
    doc_number: String,
    doc_type: String,
    title: String,
    issue_date: String,
    effective_date: Option<String>,
    signer: Option<String>,
    issuing_body: Option<String>,
    status: String,
    content_summary: Option<String>,
    content_full: Option<String>,
    original_link: String,
    pdf_url: Option<String>,
    tags: String,
    key_changes: String,
    crawled_at: String,
    created_at: String,
}

impl LegalRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            doc_number: row.get(1)?,
            doc_type: row.get(2)?,
            title: row.get(3)?,
            issue_date: row.get(4)?,
            effective_date: row.get(5)?,
            signer: row.get(6)?,
            issuing_body: row.get(7)?,
            status: row.get(8)?,
            content_summary: row.get(9)?,
            content_full: row.get(10)?,
            original_link: row.get(11)?,
            pdf_url: row.get(12)?,
            tags: row.get(13)?,
            key_changes: row.get(14)?,
            crawled_at: row.get(15)?,
            created_at: row.get(16)?,
        })
    }

    fn into_record(self) -> StorageResult<LegalDocumentRecord> {
        Ok(LegalDocumentRecord {
            id: self.id,
            document: NewLegalDocument {
                doc_number: self.doc_number,
                doc_type: self.doc_type,
                title: self.title,
                issue_date: parse_date(&self.issue_date)?,
                effective_date: self.effective_date.as_deref().map(parse_date).transpose()?,
                signer: self.signer,
                issuing_body: self.issuing_body,
                status: DocStatus::from_db_string(&self.status).unwrap_or_default(),
                content_summary: self.content_summary,
                content_full: self.content_full,
                original_link: self.original_link,
                pdf_url: self.pdf_url,
                tags: decode_list(&self.tags)?,
                key_changes: decode_list(&self.key_changes)?,
                crawled_at: parse_timestamp(&self.crawled_at)?,
            },
            created_at: self.created_at,
        })
    }
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn insert_crawl_run(&mut self, run: &CrawlRun) -> StorageResult<i64> {
        self.conn
            .execute(
                "INSERT INTO crawl_runs (source, crawl_type, status, items_found, items_processed,
                 items_skipped, sources_failed, partial, error_message, config_hash, started_at, completed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    run.source,
                    run.crawl_type.to_db_string(),
                    run.status.to_db_string(),
                    run.items_found as i64,
                    run.items_processed as i64,
                    run.items_skipped as i64,
                    run.sources_failed,
                    run.partial,
                    run.error_message,
                    run.config_hash,
                    run.started_at.to_rfc3339(),
                    run.completed_at.map(|t| t.to_rfc3339()),
                ],
            )
            .map_err(map_write_error)?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update_crawl_run(&mut self, run: &CrawlRun) -> StorageResult<()> {
        let id = run.id.ok_or(StorageError::UnsavedRun)?;
        let updated = self
            .conn
            .execute(
                "UPDATE crawl_runs SET status = ?1, items_found = ?2, items_processed = ?3,
                 items_skipped = ?4, sources_failed = ?5, partial = ?6, error_message = ?7,
                 completed_at = ?8 WHERE id = ?9",
                params![
                    run.status.to_db_string(),
                    run.items_found as i64,
                    run.items_processed as i64,
                    run.items_skipped as i64,
                    run.sources_failed,
                    run.partial,
                    run.error_message,
                    run.completed_at.map(|t| t.to_rfc3339()),
                    id,
                ],
            )
            .map_err(map_write_error)?;

        if updated == 0 {
            return Err(StorageError::RunNotFound(id));
        }
        Ok(())
    }

    fn get_crawl_run(&self, run_id: i64) -> StorageResult<CrawlRun> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {} FROM crawl_runs WHERE id = ?1", RUN_COLUMNS),
                params![run_id],
                RunRow::read,
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))?;
        row.into_run()
    }

    fn latest_runs(&self, limit: usize) -> StorageResult<Vec<CrawlRun>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM crawl_runs ORDER BY id DESC LIMIT ?1",
            RUN_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![limit as i64], RunRow::read)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(RunRow::into_run).collect()
    }

    fn count_runs_by_status(&self, status: RunStatus) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM crawl_runs WHERE status = ?1",
            params![status.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    // ===== Records =====

    fn exists_by_identity_key(&self, kind: CrawlType, key: &str) -> StorageResult<bool> {
        let sql = match kind {
            CrawlType::LegalDocs => "SELECT 1 FROM legal_documents WHERE doc_number = ?1",
            CrawlType::NewsArticles => "SELECT 1 FROM articles WHERE source_url = ?1",
        };
        let found: Option<i64> = self
            .conn
            .query_row(sql, params![key], |row| row.get(0))
            .optional()?;
        Ok(found.is_some())
    }

    fn insert_article(&mut self, article: &NewArticle) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                &format!(
                    "INSERT INTO articles ({}) VALUES (NULL, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                    ARTICLE_COLUMNS
                ),
                params![
                    article.title,
                    article.slug,
                    article.summary,
                    article.content_html,
                    article.source_url,
                    article.source_name,
                    article.image_url,
                    encode_list(&article.tags)?,
                    article.has_disclaimer,
                    article.meta_title,
                    article.meta_description,
                    article.status.to_db_string(),
                    article.published_at.map(|t| t.to_rfc3339()),
                    article.crawled_at.to_rfc3339(),
                    now,
                ],
            )
            .map_err(map_write_error)?;
        Ok(self.conn.last_insert_rowid())
    }

    fn insert_legal_document(&mut self, document: &NewLegalDocument) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                &format!(
                    "INSERT INTO legal_documents ({}) VALUES (NULL, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                    LEGAL_COLUMNS
                ),
                params![
                    document.doc_number,
                    document.doc_type,
                    document.title,
                    document.issue_date.format(DATE_FORMAT).to_string(),
                    document
                        .effective_date
                        .map(|d| d.format(DATE_FORMAT).to_string()),
                    document.signer,
                    document.issuing_body,
                    document.status.to_db_string(),
                    document.content_summary,
                    document.content_full,
                    document.original_link,
                    document.pdf_url,
                    encode_list(&document.tags)?,
                    encode_list(&document.key_changes)?,
                    document.crawled_at.to_rfc3339(),
                    now,
                ],
            )
            .map_err(map_write_error)?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_article_by_url(&self, source_url: &str) -> StorageResult<Option<ArticleRecord>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM articles WHERE source_url = ?1", ARTICLE_COLUMNS),
                params![source_url],
                ArticleRow::read,
            )
            .optional()?
            .map(ArticleRow::into_record)
            .transpose()
    }

    fn get_legal_document(&self, doc_number: &str) -> StorageResult<Option<LegalDocumentRecord>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {} FROM legal_documents WHERE doc_number = ?1",
                    LEGAL_COLUMNS
                ),
                params![doc_number],
                LegalRow::read,
            )
            .optional()?
            .map(LegalRow::into_record)
            .transpose()
    }

    // ===== Statistics =====

    fn count_articles(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM articles", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_legal_documents(&self) -> StorageResult<u64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM legal_documents", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
