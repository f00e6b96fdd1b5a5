//! Ingestion gate: existence check, optional transformation, persistence
//!
//! The gate is the only writer of articles and legal documents. Every candidate ends up
//! in exactly one of the report's three counters.

use crate::config::IngestConfig;
use crate::crawler::{CandidateDetails, LegalFields, NewsFields, RawCandidate};
use crate::ingest::transform::Transformer;
use crate::state::CrawlType;
use crate::storage::{
    ArticleStatus, NewArticle, NewLegalDocument, SharedStorage, Storage, StorageError,
};
use crate::WatchError;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Characters of the title used as a summary when the listing had none
const TITLE_SUMMARY_CHARS: usize = 200;

/// Outcome counts of one ingestion pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Newly persisted records
    pub processed: u64,
    /// Records already in the store
    pub skipped: u64,
    /// Records whose insert failed
    pub failed: u64,
}

impl IngestReport {
    pub fn total(&self) -> u64 {
        self.processed + self.skipped + self.failed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemOutcome {
    Inserted,
    Skipped,
    Failed,
}

/// Hands candidates to the store, once each
pub struct IngestionGate {
    storage: SharedStorage,
    transformer: Arc<dyn Transformer>,
    settings: IngestConfig,
}

impl IngestionGate {
    pub fn new(
        storage: SharedStorage,
        transformer: Arc<dyn Transformer>,
        settings: IngestConfig,
    ) -> Self {
        Self {
            storage,
            transformer,
            settings,
        }
    }

    /// Ingests candidates in order
    ///
    /// Per-item storage failures are logged and counted; only a poisoned store lock
    /// aborts the pass.
    ///
    /// # Returns
    ///
    /// * `Ok(IngestReport)` - Counts for every candidate
    /// * `Err(WatchError)` - The store became unusable
    pub async fn ingest(
        &self,
        candidates: &[RawCandidate],
        crawl_type: CrawlType,
    ) -> Result<IngestReport, WatchError> {
        let mut report = IngestReport::default();

        for candidate in candidates {
            let outcome = match &candidate.details {
                CandidateDetails::Legal(fields) => self.ingest_legal(candidate, fields).await?,
                CandidateDetails::News(fields) => self.ingest_article(candidate, fields).await?,
            };
            match outcome {
                ItemOutcome::Inserted => report.processed += 1,
                ItemOutcome::Skipped => report.skipped += 1,
                ItemOutcome::Failed => report.failed += 1,
            }
        }

        info!(
            crawl_type = %crawl_type,
            candidates = candidates.len(),
            processed = report.processed,
            skipped = report.skipped,
            failed = report.failed,
            "Ingestion finished"
        );

        Ok(report)
    }

    /// Looks the key up in the store
    ///
    /// Returns the outcome when the candidate must not be inserted: `Skipped` if it is
    /// already stored, `Failed` if the lookup itself failed. Only a poisoned lock is an error.
    fn check_existing(&self, kind: CrawlType, key: &str) -> Result<Option<ItemOutcome>, WatchError> {
        let storage = self.storage.lock().map_err(|_| StorageError::LockPoisoned)?;
        match storage.exists_by_identity_key(kind, key) {
            Ok(true) => {
                debug!(key, "Record already exists, skipping");
                Ok(Some(ItemOutcome::Skipped))
            }
            Ok(false) => Ok(None),
            Err(StorageError::LockPoisoned) => Err(StorageError::LockPoisoned.into()),
            Err(e) => {
                warn!(key, error = %e, "Existence check failed, not inserting");
                Ok(Some(ItemOutcome::Failed))
            }
        }
    }

    fn persist<F>(&self, key: &str, insert: F) -> Result<ItemOutcome, WatchError>
    where
        F: FnOnce(&mut (dyn Storage + Send)) -> Result<i64, StorageError>,
    {
        let mut storage = self.storage.lock().map_err(|_| StorageError::LockPoisoned)?;
        match insert(&mut *storage) {
            Ok(id) => {
                debug!(key, id, "Record stored");
                Ok(ItemOutcome::Inserted)
            }
            Err(StorageError::ConstraintViolation(message)) => {
                warn!(key, %message, "Record stored concurrently, not inserted");
                Ok(ItemOutcome::Failed)
            }
            Err(e) => {
                warn!(key, error = %e, "Failed to store record");
                Ok(ItemOutcome::Failed)
            }
        }
    }

    async fn ingest_legal(
        &self,
        candidate: &RawCandidate,
        fields: &LegalFields,
    ) -> Result<ItemOutcome, WatchError> {
        let doc_number = fields.doc_number.as_str();
        if let Some(outcome) = self.check_existing(CrawlType::LegalDocs, doc_number)? {
            return Ok(outcome);
        }

        let mut content_summary = Some(candidate.summary.trim().to_string()).filter(|s| !s.is_empty());
        let mut key_changes = Vec::new();

        let has_usable_abstract = content_summary
            .as_deref()
            .is_some_and(|s| s.chars().count() >= self.settings.min_summary_length);
        let content = fields.content_full.as_deref().filter(|c| !c.trim().is_empty());

        if let Some(content) = content.filter(|_| self.settings.ai_rewrite_enabled && !has_usable_abstract) {
            match self
                .transformer
                .summarize_legal_doc(&candidate.title, content, doc_number)
                .await
            {
                Ok(summary) => {
                    content_summary = Some(summary.executive_summary);
                    key_changes = summary.key_changes;
                }
                Err(e) => warn!(doc_number, error = %e, "Summarization failed, keeping raw fields"),
            }
        }

        let document = NewLegalDocument {
            doc_number: doc_number.to_string(),
            doc_type: fields
                .doc_type
                .clone()
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| "Unknown".to_string()),
            title: candidate.title.clone(),
            issue_date: fields.issue_date.unwrap_or_else(|| Utc::now().date_naive()),
            effective_date: fields.effective_date,
            signer: fields.signer.clone(),
            issuing_body: fields.issuing_body.clone(),
            status: fields.status,
            content_summary,
            content_full: fields.content_full.clone(),
            original_link: candidate.link.clone(),
            pdf_url: fields.pdf_url.clone(),
            tags: fields.tags.clone(),
            key_changes,
            crawled_at: candidate.extracted_at,
        };

        self.persist(doc_number, |storage| storage.insert_legal_document(&document))
    }

    async fn ingest_article(
        &self,
        candidate: &RawCandidate,
        fields: &NewsFields,
    ) -> Result<ItemOutcome, WatchError> {
        let source_url = candidate.link.as_str();
        if let Some(outcome) = self.check_existing(CrawlType::NewsArticles, source_url)? {
            return Ok(outcome);
        }

        let mut title = candidate.title.clone();
        let mut summary = if candidate.summary.trim().is_empty() {
            title.chars().take(TITLE_SUMMARY_CHARS).collect()
        } else {
            candidate.summary.clone()
        };
        let mut content_html = fields.content_html.clone().unwrap_or_default();
        let mut tags = Vec::new();
        let mut has_disclaimer = false;

        if self.settings.ai_rewrite_enabled
            && content_html.chars().count() > self.settings.min_content_length
        {
            match self
                .transformer
                .rewrite_article(&content_html, &title, &candidate.source_display_name)
                .await
            {
                Ok(rewrite) => {
                    title = rewrite.title;
                    content_html = rewrite.content_html;
                    if !rewrite.summary.trim().is_empty() {
                        summary = rewrite.summary;
                    }
                    tags = rewrite.tags;
                    has_disclaimer = rewrite.has_disclaimer;
                }
                Err(e) => warn!(source_url, error = %e, "Rewrite failed, keeping raw fields"),
            }
        }

        if content_html.trim().is_empty() {
            content_html = format!("<p>{}</p>", summary);
        }

        let now = Utc::now();
        let status = if self.settings.auto_publish {
            ArticleStatus::Published
        } else {
            ArticleStatus::Draft
        };
        let article = NewArticle {
            slug: slugify(&title).unwrap_or_else(|| format!("article-{}", now.timestamp())),
            meta_title: Some(title.clone()),
            meta_description: Some(summary.clone()),
            title,
            summary,
            content_html,
            source_url: source_url.to_string(),
            source_name: candidate.source_display_name.clone(),
            image_url: candidate.image_url.clone(),
            tags,
            has_disclaimer,
            status,
            published_at: (status == ArticleStatus::Published).then_some(now),
            crawled_at: candidate.extracted_at,
        };

        self.persist(source_url, |storage| storage.insert_article(&article))
    }
}

fn fold_vietnamese(c: char) -> char {
    match c {
        'à' | 'á' | 'ả' | 'ã' | 'ạ' | 'ă' | 'ằ' | 'ắ' | 'ẳ' | 'ẵ' | 'ặ' | 'â' | 'ầ' | 'ấ' | 'ẩ'
        | 'ẫ' | 'ậ' => 'a',
        'è' | 'é' | 'ẻ' | 'ẽ' | 'ẹ' | 'ê' | 'ề' | 'ế' | 'ể' | 'ễ' | 'ệ' => 'e',
        'ì' | 'í' | 'ỉ' | 'ĩ' | 'ị' => 'i',
        'ò' | 'ó' | 'ỏ' | 'õ' | 'ọ' | 'ô' | 'ồ' | 'ố' | 'ổ' | 'ỗ' | 'ộ' | 'ơ' | 'ờ' | 'ớ' | 'ở'
        | 'ỡ' | 'ợ' => 'o',
        'ù' | 'ú' | 'ủ' | 'ũ' | 'ụ' | 'ư' | 'ừ' | 'ứ' | 'ử' | 'ữ' | 'ự' => 'u',
        'ỳ' | 'ý' | 'ỷ' | 'ỹ' | 'ỵ' => 'y',
        'đ' => 'd',
        other => other,
    }
}

/// URL slug of a title: ASCII-folded, lowercase, dash-separated
///
/// Returns `None` when nothing alphanumeric is left.
pub fn slugify(title: &str) -> Option<String> {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;

    for c in title.to_lowercase().chars() {
        // Combining marks of decomposed input
        if ('\u{0300}'..='\u{036f}').contains(&c) {
            continue;
        }
        let c = fold_vietnamese(c);
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }

    (!slug.is_empty()).then_some(slug)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::DocStatus;
    use crate::ingest::transform::{ArticleRewrite, LegalSummary, TransformError};
    use crate::storage::{
        shared, ArticleRecord, LegalDocumentRecord, SqliteStorage, StorageResult,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_slugify_vietnamese() {
        assert_eq!(
            slugify("Bảo hiểm Nhân thọ: tăng trưởng 15%!").as_deref(),
            Some("bao-hiem-nhan-tho-tang-truong-15")
        );
        assert_eq!(slugify("Đề xuất sửa đổi").as_deref(), Some("de-xuat-sua-doi"));
    }

    #[test]
    fn test_slugify_empty() {
        assert_eq!(slugify("  —  "), None);
        assert_eq!(slugify(""), None);
    }


    /// Fails every call and counts them
    #[derive(Default)]
    struct FailingTransformer {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Transformer for FailingTransformer {
        async fn rewrite_article(
            &self,
            _raw_text: &str,
            _title: &str,
            _source: &str,
        ) -> Result<ArticleRewrite, TransformError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(TransformError::Malformed("not json".to_string()))
        }

        async fn summarize_legal_doc(
            &self,
            _title: &str,
            _content: &str,
            _doc_number: &str,
        ) -> Result<LegalSummary, TransformError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(TransformError::Malformed("not json".to_string()))
        }
    }

    struct SummarizingTransformer;

    #[async_trait]
    impl Transformer for SummarizingTransformer {
        async fn rewrite_article(
            &self,
            _raw_text: &str,
            title: &str,
            _source: &str,
        ) -> Result<ArticleRewrite, TransformError> {
            Ok(ArticleRewrite {
                title: format!("{} (biên tập)", title),
                content_html: "<p>Viết lại</p>".to_string(),
                summary: "Tóm tắt mới".to_string(),
                tags: vec!["bảo hiểm".to_string()],
                has_disclaimer: true,
            })
        }

        async fn summarize_legal_doc(
            &self,
            _title: &str,
            _content: &str,
            _doc_number: &str,
        ) -> Result<LegalSummary, TransformError> {
            Ok(LegalSummary {
                brief_title: "Bản tin".to_string(),
                executive_summary: "Tóm tắt điều hành".to_string(),
                key_changes: vec!["Thay đổi 1".to_string()],
                affected_parties: serde_json::Value::Null,
            })
        }
    }

    fn settings(ai: bool) -> IngestConfig {
        IngestConfig {
            ai_rewrite_enabled: ai,
            min_summary_length: 20,
            min_content_length: 10,
            ..IngestConfig::default()
        }
    }

    fn legal(number: &str, summary: &str, content: Option<&str>) -> RawCandidate {
        RawCandidate {
            identity_key: number.to_string(),
            title: format!("Nghị định {}", number),
            summary: summary.to_string(),
            link: format!("https://tvpl.test/vb/{}", number.replace('/', "-")),
            image_url: None,
            source_name: "tvpl".to_string(),
            source_display_name: "TVPL".to_string(),
            extracted_at: Utc::now(),
            details: CandidateDetails::Legal(LegalFields {
                doc_number: number.to_string(),
                status: DocStatus::Active,
                content_full: content.map(String::from),
                ..LegalFields::default()
            }),
        }
    }

    fn news(url: &str, content: Option<&str>) -> RawCandidate {
        RawCandidate {
            identity_key: url.to_string(),
            title: "Bảo hiểm xe cơ giới".to_string(),
            summary: "Phí tăng".to_string(),
            link: url.to_string(),
            image_url: None,
            source_name: "cafef".to_string(),
            source_display_name: "CafeF".to_string(),
            extracted_at: Utc::now(),
            details: CandidateDetails::News(NewsFields {
                is_company_source: false,
                content_html: content.map(String::from),
            }),
        }
    }

    #[tokio::test]
    async fn test_existing_document_is_skipped() {
        let storage = shared(SqliteStorage::new_in_memory().unwrap());
        let gate = IngestionGate::new(
            storage.clone(),
            Arc::new(FailingTransformer::default()),
            settings(false),
        );

        let first = gate
            .ingest(&[legal("52/2024/NĐ-CP", "", None)], CrawlType::LegalDocs)
            .await
            .unwrap();
        assert_eq!(first.processed, 1);

        let again = gate
            .ingest(&[legal("52/2024/NĐ-CP", "", None)], CrawlType::LegalDocs)
            .await
            .unwrap();
        assert_eq!(again, IngestReport { processed: 0, skipped: 1, failed: 0 });
        assert_eq!(storage.lock().unwrap().count_legal_documents().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_transform_failure_keeps_raw_fields() {
        let storage = shared(SqliteStorage::new_in_memory().unwrap());
        let transformer = Arc::new(FailingTransformer::default());
        let gate = IngestionGate::new(storage.clone(), transformer.clone(), settings(true));

        let report = gate
            .ingest(
                &[news("https://cafef.vn/a.chn", Some("<p>Nội dung bài báo dài hơn ngưỡng</p>"))],
                CrawlType::NewsArticles,
            )
            .await
            .unwrap();

        assert_eq!(report.processed, 1);
        assert_eq!(transformer.calls.load(Ordering::SeqCst), 1);
        let stored = storage
            .lock()
            .unwrap()
            .get_article_by_url("https://cafef.vn/a.chn")
            .unwrap()
            .unwrap();
        assert_eq!(stored.article.title, "Bảo hiểm xe cơ giới");
        assert_eq!(stored.article.content_html, "<p>Nội dung bài báo dài hơn ngưỡng</p>");
        assert_eq!(stored.article.slug, "bao-hiem-xe-co-gioi");
        assert_eq!(stored.article.status, ArticleStatus::Draft);
        assert!(stored.article.published_at.is_none());
    }

    #[tokio::test]
    async fn test_short_content_not_transformed() {
        let storage = shared(SqliteStorage::new_in_memory().unwrap());
        let transformer = Arc::new(FailingTransformer::default());
        let gate = IngestionGate::new(storage.clone(), transformer.clone(), settings(true));

        gate.ingest(&[news("https://cafef.vn/b.chn", None)], CrawlType::NewsArticles)
            .await
            .unwrap();

        assert_eq!(transformer.calls.load(Ordering::SeqCst), 0);
        let stored = storage
            .lock()
            .unwrap()
            .get_article_by_url("https://cafef.vn/b.chn")
            .unwrap()
            .unwrap();
        assert_eq!(stored.article.content_html, "<p>Phí tăng</p>");
    }

    #[tokio::test]
    async fn test_rewrite_applied_and_published() {
        let storage = shared(SqliteStorage::new_in_memory().unwrap());
        let mut config = settings(true);
        config.auto_publish = true;
        let gate = IngestionGate::new(storage.clone(), Arc::new(SummarizingTransformer), config);

        gate.ingest(
            &[news("https://cafef.vn/c.chn", Some("<p>Nội dung đủ dài để viết lại</p>"))],
            CrawlType::NewsArticles,
        )
        .await
        .unwrap();

        let stored = storage
            .lock()
            .unwrap()
            .get_article_by_url("https://cafef.vn/c.chn")
            .unwrap()
            .unwrap();
        assert_eq!(stored.article.title, "Bảo hiểm xe cơ giới (biên tập)");
        assert_eq!(stored.article.summary, "Tóm tắt mới");
        assert!(stored.article.has_disclaimer);
        assert_eq!(stored.article.status, ArticleStatus::Published);
        assert!(stored.article.published_at.is_some());
    }

    #[tokio::test]
    async fn test_legal_summarized_only_without_abstract() {
        let storage = shared(SqliteStorage::new_in_memory().unwrap());
        let gate = IngestionGate::new(storage.clone(), Arc::new(SummarizingTransformer), settings(true));

        let long_abstract = "Quy định chi tiết một số điều của Luật Kinh doanh bảo hiểm";
        gate.ingest(
            &[
                legal("1/2024/NĐ-CP", "", Some("<p>Toàn văn</p>")),
                legal("2/2024/NĐ-CP", long_abstract, Some("<p>Toàn văn</p>")),
                legal("3/2024/NĐ-CP", "", None),
            ],
            CrawlType::LegalDocs,
        )
        .await
        .unwrap();

        let guard = storage.lock().unwrap();
        let first = guard.get_legal_document("1/2024/NĐ-CP").unwrap().unwrap();
        assert_eq!(first.document.content_summary.as_deref(), Some("Tóm tắt điều hành"));
        assert_eq!(first.document.key_changes, vec!["Thay đổi 1".to_string()]);
        assert_eq!(first.document.doc_type, "Unknown");
        assert_eq!(first.document.issue_date, Utc::now().date_naive());

        let second = guard.get_legal_document("2/2024/NĐ-CP").unwrap().unwrap();
        assert_eq!(second.document.content_summary.as_deref(), Some(long_abstract));

        let third = guard.get_legal_document("3/2024/NĐ-CP").unwrap().unwrap();
        assert!(third.document.content_summary.is_none());
    }

    #[tokio::test]
    async fn test_repeated_candidate_stored_once() {
        let storage = shared(SqliteStorage::new_in_memory().unwrap());
        let gate = IngestionGate::new(
            storage.clone(),
            Arc::new(FailingTransformer::default()),
            settings(false),
        );

        // The second copy finds the first in the store
        let report = gate
            .ingest(
                &[news("https://cafef.vn/d.chn", None), news("https://cafef.vn/d.chn", None)],
                CrawlType::NewsArticles,
            )
            .await
            .unwrap();

        assert_eq!(report.processed, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed, 0);
    }

    /// Delegates to SQLite but cannot answer existence checks for one key
    struct UnreachableKeyStore {
        inner: SqliteStorage,
        broken_key: &'static str,
    }

    impl Storage for UnreachableKeyStore {
        fn insert_crawl_run(&mut self, run: &crate::state::CrawlRun) -> StorageResult<i64> {
            self.inner.insert_crawl_run(run)
        }

        fn update_crawl_run(&mut self, run: &crate::state::CrawlRun) -> StorageResult<()> {
            self.inner.update_crawl_run(run)
        }

        fn get_crawl_run(&self, run_id: i64) -> StorageResult<crate::state::CrawlRun> {
            self.inner.get_crawl_run(run_id)
        }

        fn latest_runs(&self, limit: usize) -> StorageResult<Vec<crate::state::CrawlRun>> {
            self.inner.latest_runs(limit)
        }

        fn count_runs_by_status(&self, status: crate::state::RunStatus) -> StorageResult<u64> {
            self.inner.count_runs_by_status(status)
        }

        fn exists_by_identity_key(&self, kind: CrawlType, key: &str) -> StorageResult<bool> {
            if key == self.broken_key {
                return Err(StorageError::Database("connection lost".to_string()));
            }
            self.inner.exists_by_identity_key(kind, key)
        }

        fn insert_article(&mut self, article: &NewArticle) -> StorageResult<i64> {
            self.inner.insert_article(article)
        }

        fn insert_legal_document(&mut self, document: &NewLegalDocument) -> StorageResult<i64> {
            self.inner.insert_legal_document(document)
        }

        fn get_article_by_url(&self, source_url: &str) -> StorageResult<Option<ArticleRecord>> {
            self.inner.get_article_by_url(source_url)
        }

        fn get_legal_document(&self, doc_number: &str) -> StorageResult<Option<LegalDocumentRecord>> {
            self.inner.get_legal_document(doc_number)
        }

        fn count_articles(&self) -> StorageResult<u64> {
            self.inner.count_articles()
        }

        fn count_legal_documents(&self) -> StorageResult<u64> {
            self.inner.count_legal_documents()
        }
    }

    #[tokio::test]
    async fn test_lookup_failure_counts_item_and_continues() {
        let storage = shared(UnreachableKeyStore {
            inner: SqliteStorage::new_in_memory().unwrap(),
            broken_key: "https://cafef.vn/b.chn",
        });
        let gate = IngestionGate::new(
            storage.clone(),
            Arc::new(FailingTransformer::default()),
            settings(false),
        );

        let report = gate
            .ingest(
                &[
                    news("https://cafef.vn/a.chn", None),
                    news("https://cafef.vn/b.chn", None),
                    news("https://cafef.vn/c.chn", None),
                ],
                CrawlType::NewsArticles,
            )
            .await
            .unwrap();

        assert_eq!(report, IngestReport { processed: 2, skipped: 0, failed: 1 });
        let guard = storage.lock().unwrap();
        assert_eq!(guard.count_articles().unwrap(), 2);
        assert!(guard.get_article_by_url("https://cafef.vn/b.chn").unwrap().is_none());
        assert!(guard.get_article_by_url("https://cafef.vn/c.chn").unwrap().is_some());
    }

    #[test]
    fn test_report_total() {
        let report = IngestReport {
            processed: 2,
            skipped: 1,
            failed: 1,
        };
        assert_eq!(report.total(), 4);
    }
}
