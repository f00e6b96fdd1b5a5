//! Database schema definitions and migrations
//!
//! This module contains all SQL schema definitions for the Insurwatch database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Audit record of every crawl invocation
CREATE TABLE IF NOT EXISTS crawl_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source TEXT NOT NULL,
    crawl_type TEXT NOT NULL,
    status TEXT NOT NULL,
    items_found INTEGER NOT NULL DEFAULT 0,
    items_processed INTEGER NOT NULL DEFAULT 0,
    items_skipped INTEGER NOT NULL DEFAULT 0,
    sources_failed INTEGER NOT NULL DEFAULT 0,
    partial INTEGER NOT NULL DEFAULT 0,
    error_message TEXT,
    config_hash TEXT NOT NULL,
    started_at TEXT NOT NULL,
    completed_at TEXT,
    CHECK (items_processed <= items_found)
);

CREATE INDEX IF NOT EXISTS idx_crawl_runs_status ON crawl_runs(status);
CREATE INDEX IF NOT EXISTS idx_crawl_runs_started ON crawl_runs(started_at);

-- News articles
CREATE TABLE IF NOT EXISTS articles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    slug TEXT NOT NULL,
    summary TEXT NOT NULL,
    content_html TEXT NOT NULL,
    source_url TEXT NOT NULL UNIQUE,
    source_name TEXT NOT NULL,
    image_url TEXT,
    tags TEXT NOT NULL DEFAULT '[]',
    has_disclaimer INTEGER NOT NULL DEFAULT 0,
    meta_title TEXT,
    meta_description TEXT,
    status TEXT NOT NULL,
    published_at TEXT,
    crawled_at TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_articles_source ON articles(source_name);
CREATE INDEX IF NOT EXISTS idx_articles_slug ON articles(slug);

-- Legal documents
CREATE TABLE IF NOT EXISTS legal_documents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    doc_number TEXT NOT NULL UNIQUE,
    doc_type TEXT NOT NULL,
    title TEXT NOT NULL,
    issue_date TEXT NOT NULL,
    effective_date TEXT,
    signer TEXT,
    issuing_body TEXT,
    status TEXT NOT NULL,
    content_summary TEXT,
    content_full TEXT,
    original_link TEXT NOT NULL,
    pdf_url TEXT,
    tags TEXT NOT NULL DEFAULT '[]',
    key_changes TEXT NOT NULL DEFAULT '[]',
    crawled_at TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_legal_documents_type ON legal_documents(doc_type);
CREATE INDEX IF NOT EXISTS idx_legal_documents_issue_date ON legal_documents(issue_date);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
