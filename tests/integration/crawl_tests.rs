//! Integration tests for the crawler
//!
//! These tests use wiremock to serve listing and detail pages and run full
//! crawl cycles, from configuration loading to the stored records and the
//! persisted crawl-run entry.

use chrono::{NaiveDate, Utc};
use insurwatch::config::load_config_with_hash;
use insurwatch::crawler::{
    build_filter, build_transport, CoordinatorSettings, CrawlRunResult, DocStatus,
    RunCoordinator, SourceOverrides, SourceRegistry,
};
use insurwatch::ingest::{ChatTransformer, DisabledTransformer, IngestionGate, Transformer};
use insurwatch::output::load_statistics;
use insurwatch::state::{CrawlType, RunStatus};
use insurwatch::storage::{self, NewLegalDocument, SharedStorage, SqliteStorage, Storage};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const KEYWORDS: &str = r#"keywords = ["bảo hiểm", "bồi thường"]"#;

fn crawler_section(max_retries: u32) -> String {
    format!(
        r#"
[crawler]
request-delay-ms = 0
retry-base-delay-ms = 1
max-retries = {}
timeout-secs = 5
max-concurrent-sources = 2
run-timeout-secs = 30

[transport]
renderer = "http"
user-agents = ["Mozilla/5.0 (X11; Linux x86_64) TestAgent/1.0"]
"#,
        max_retries
    )
}

fn news_source(name: &str, base: &str, categories: &[&str]) -> String {
    let targets = categories
        .iter()
        .map(|c| format!("\"{}{}\"", base, c))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        r#"
[[source]]
name = "{name}"
display-name = "{name} news"
kind = "news"
base-url = "{base}"
targets = [{targets}]
detail-fetch = "never"
selectors = {{ item = ".story", title = "h3 a", summary = ".sapo" }}
"#
    )
}

fn legal_source(base: &str, max_pages: u32) -> String {
    format!(
        r#"
[[source]]
name = "tvpl"
display-name = "Thư viện pháp luật"
kind = "legal"
base-url = "{base}"
targets = ["{base}/tim-van-ban"]
queries = ["bảo hiểm"]
max-pages = {max_pages}
selectors = {{ item = ".item-row", title = "a.title", summary = ".trich-yeu", doc-number = ".so-hieu", issue-date = ".ngay-ban-hanh" }}
detail-selectors = {{ content = ".noi-dung", status = ".tinh-trang", signer = ".nguoi-ky" }}
"#
    )
}

struct Harness {
    coordinator: RunCoordinator,
    registry: SourceRegistry,
    storage: SharedStorage,
    _dir: TempDir,
}

impl Harness {
    fn new(body: &str) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = dir.path().join("insurwatch.db");
        let config_path = dir.path().join("insurwatch.toml");
        let toml = format!(
            "{}\n[output]\ndatabase-path = '{}'\n",
            body,
            db_path.display()
        );
        std::fs::write(&config_path, toml).expect("Failed to write config");

        let (config, hash) = load_config_with_hash(&config_path).expect("Config should load");
        let storage = storage::shared(SqliteStorage::new(&db_path).expect("Failed to open db"));

        let transformer: Arc<dyn Transformer> = match ChatTransformer::from_config(&config.ingest)
            .expect("Failed to build transformer")
        {
            Some(chat) if config.ingest.ai_rewrite_enabled => Arc::new(chat),
            _ => Arc::new(DisabledTransformer),
        };
        let gate = Arc::new(IngestionGate::new(
            storage.clone(),
            transformer,
            config.ingest.clone(),
        ));
        let coordinator = RunCoordinator::new(
            storage.clone(),
            build_transport(&config, false).expect("Failed to build transport"),
            gate,
            build_filter(&config),
            CoordinatorSettings::from_config(&config.crawler),
            hash,
        );

        Self {
            coordinator,
            registry: SourceRegistry::from_config(&config),
            storage,
            _dir: dir,
        }
    }

    async fn run(&self, crawl_type: CrawlType) -> CrawlRunResult {
        self.run_with(crawl_type, &CancellationToken::new()).await
    }

    async fn run_with(&self, crawl_type: CrawlType, cancel: &CancellationToken) -> CrawlRunResult {
        self.coordinator
            .run_type(crawl_type, &self.registry, &SourceOverrides::default(), cancel)
            .await
            .expect("Run should be recorded")
    }

    fn with_storage<T>(&self, f: impl FnOnce(&(dyn Storage + Send)) -> T) -> T {
        let storage = self.storage.lock().expect("Storage lock poisoned");
        f(&*storage)
    }
}

fn html_page(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(format!("<html><body>{}</body></html>", body))
        .insert_header("content-type", "text/html; charset=utf-8")
}

fn story(href: &str, title: &str, sapo: &str) -> String {
    format!(
        r#"<div class="story"><h3><a href="{}">{}</a></h3><p class="sapo">{}</p></div>"#,
        href, title, sapo
    )
}

/// Five items: two relevant, two off-topic, one repeating the first link
fn mixed_category() -> String {
    [
        story("/tin/bao-hiem-nhan-tho.chn", "Doanh thu bảo hiểm nhân thọ tăng", "Quý ba khởi sắc"),
        story("/tin/chung-khoan.chn", "Chứng khoán giảm điểm", "Thị trường đỏ sàn"),
        story("/tin/boi-thuong-bao-lu.chn", "Chi trả bồi thường sau bão", "Hàng nghìn hồ sơ"),
        story("/tin/bat-dong-san.chn", "Giá nhà tăng mạnh", "Nguồn cung khan hiếm"),
        story("/tin/bao-hiem-nhan-tho.chn", "Doanh thu bảo hiểm nhân thọ tăng", "Bản sao"),
    ]
    .concat()
}

#[tokio::test]
async fn test_news_crawl_filters_and_deduplicates() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/bao-hiem.chn"))
        .respond_with(html_page(&mixed_category()))
        .expect(1)
        .mount(&server)
        .await;

    let harness = Harness::new(&format!(
        "{}\n[filter]\n{}\n{}",
        crawler_section(0),
        KEYWORDS,
        news_source("cafef", &base, &["/bao-hiem.chn"])
    ));

    let result = harness.run(CrawlType::NewsArticles).await;

    assert_eq!(result.run.status, RunStatus::Completed);
    assert!(!result.run.partial);
    assert_eq!(result.run.source, "cafef");
    assert_eq!(result.run.items_found, 2);
    assert_eq!(result.run.items_processed, 2);
    assert_eq!(result.run.sources_failed, 0);

    let report = &result.reports[0];
    assert_eq!(report.items_parsed, 5);
    assert_eq!(report.dropped_irrelevant, 2);
    assert_eq!(report.dropped_duplicate, 1);
    assert_eq!(report.accepted, 2);

    let url = format!("{}/tin/boi-thuong-bao-lu.chn", base);
    let article = harness
        .with_storage(|s| s.get_article_by_url(&url))
        .expect("Query failed")
        .expect("Article should be stored");
    assert_eq!(article.article.title, "Chi trả bồi thường sau bão");
    assert_eq!(article.article.summary, "Hàng nghìn hồ sơ");
    assert_eq!(article.article.content_html, "<p>Hàng nghìn hồ sơ</p>");
    assert_eq!(article.article.source_name, "cafef news");
    assert_eq!(article.article.slug, "chi-tra-boi-thuong-sau-bao");
}

#[tokio::test]
async fn test_second_run_stores_nothing_new() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/bao-hiem.chn"))
        .respond_with(html_page(&mixed_category()))
        .mount(&server)
        .await;

    let harness = Harness::new(&format!(
        "{}\n[filter]\n{}\n{}",
        crawler_section(0),
        KEYWORDS,
        news_source("cafef", &base, &["/bao-hiem.chn"])
    ));

    let first = harness.run(CrawlType::NewsArticles).await;
    assert_eq!(first.run.items_processed, 2);

    let second = harness.run(CrawlType::NewsArticles).await;
    assert_eq!(second.run.status, RunStatus::Completed);
    assert_eq!(second.run.items_found, 2);
    assert_eq!(second.run.items_processed, 0);
    assert_eq!(second.run.items_skipped, 2);

    assert_eq!(harness.with_storage(|s| s.count_articles()).unwrap(), 2);
}

#[tokio::test]
async fn test_stored_legal_document_is_skipped() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/tim-van-ban"))
        .and(query_param("page", "1"))
        .respond_with(html_page(
            r#"<div class="item-row">
                <a class="title" href="/van-ban/nghi-dinh-52.aspx">Nghị định về kinh doanh bảo hiểm</a>
                <span class="so-hieu">52/2024/NĐ-CP</span>
                <span class="ngay-ban-hanh">15/05/2024</span>
            </div>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/van-ban/nghi-dinh-52.aspx"))
        .respond_with(html_page(r#"<div class="noi-dung"><p>Điều 1.</p></div>"#))
        .mount(&server)
        .await;

    let harness = Harness::new(&format!("{}\n{}", crawler_section(0), legal_source(&base, 1)));

    harness
        .storage
        .lock()
        .unwrap()
        .insert_legal_document(&NewLegalDocument {
            doc_number: "52/2024/NĐ-CP".to_string(),
            doc_type: "Nghị định".to_string(),
            title: "Nghị định về kinh doanh bảo hiểm".to_string(),
            issue_date: NaiveDate::from_ymd_opt(2024, 5, 15).unwrap(),
            effective_date: None,
            signer: None,
            issuing_body: None,
            status: DocStatus::Active,
            content_summary: None,
            content_full: None,
            original_link: format!("{}/van-ban/nghi-dinh-52.aspx", base),
            pdf_url: None,
            tags: vec![],
            key_changes: vec![],
            crawled_at: Utc::now(),
        })
        .unwrap();

    let result = harness.run(CrawlType::LegalDocs).await;

    assert_eq!(result.run.status, RunStatus::Completed);
    assert_eq!(result.run.items_found, 1);
    assert_eq!(result.run.items_processed, 0);
    assert_eq!(result.run.items_skipped, 1);
    assert_eq!(harness.with_storage(|s| s.count_legal_documents()).unwrap(), 1);
}

#[tokio::test]
async fn test_legal_walk_stops_at_empty_page() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/tim-van-ban"))
        .and(query_param("page", "1"))
        .respond_with(html_page(
            r#"<div class="item-row">
                <a class="title" href="/van-ban/thong-tu-67.aspx">Thông tư 67/2023/TT-BTC hướng dẫn Luật</a>
            </div>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/tim-van-ban"))
        .and(query_param("page", "2"))
        .respond_with(html_page("<p>Không tìm thấy kết quả</p>"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/tim-van-ban"))
        .and(query_param("page", "3"))
        .respond_with(html_page("<p>unreachable</p>"))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/van-ban/thong-tu-67.aspx"))
        .respond_with(html_page(
            r#"<span class="tinh-trang">Còn hiệu lực</span>
               <span class="nguoi-ky">Nguyễn Văn A</span>
               <div class="noi-dung"><p>Điều 1. Phạm vi điều chỉnh</p><script>track()</script></div>"#,
        ))
        .mount(&server)
        .await;

    let harness = Harness::new(&format!("{}\n{}", crawler_section(0), legal_source(&base, 3)));
    let result = harness.run(CrawlType::LegalDocs).await;

    assert_eq!(result.run.status, RunStatus::Completed);
    assert_eq!(result.run.items_processed, 1);
    assert_eq!(result.reports[0].pages_fetched, 2);

    let record = harness
        .with_storage(|s| s.get_legal_document("67/2023/TT-BTC"))
        .unwrap()
        .expect("Document should be stored");
    let document = record.document;
    assert_eq!(document.doc_type, "Thông tư");
    assert_eq!(document.status, DocStatus::Active);
    assert_eq!(document.signer.as_deref(), Some("Nguyễn Văn A"));
    let content = document.content_full.expect("Content should be stored");
    assert!(content.contains("Phạm vi điều chỉnh"));
    assert!(!content.contains("track()"));
}

#[tokio::test]
async fn test_failing_page_is_retried_then_skipped() {
    let server = MockServer::start().await;
    let base = server.uri();

    // One attempt plus three retries
    Mock::given(method("GET"))
        .and(path("/broken.chn"))
        .respond_with(ResponseTemplate::new(503))
        .expect(4)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/bao-hiem.chn"))
        .respond_with(html_page(&story(
            "/tin/phi-bao-hiem.chn",
            "Phí bảo hiểm xe máy",
            "Mức phí mới",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let harness = Harness::new(&format!(
        "{}\n[filter]\n{}\n{}",
        crawler_section(3),
        KEYWORDS,
        news_source("cafef", &base, &["/broken.chn", "/bao-hiem.chn"])
    ));
    let result = harness.run(CrawlType::NewsArticles).await;

    assert_eq!(result.run.status, RunStatus::Completed);
    assert_eq!(result.run.items_processed, 1);
    assert_eq!(result.run.sources_failed, 0);
    assert_eq!(result.reports[0].pages_failed, 1);
    assert_eq!(result.reports[0].pages_fetched, 1);
}

#[tokio::test]
async fn test_failed_source_does_not_abort_run() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/down.chn"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/bao-hiem.chn"))
        .respond_with(html_page(&mixed_category()))
        .mount(&server)
        .await;

    let harness = Harness::new(&format!(
        "{}\n[filter]\n{}\n{}\n{}",
        crawler_section(0),
        KEYWORDS,
        news_source("down", &base, &["/down.chn"]),
        news_source("cafef", &base, &["/bao-hiem.chn"])
    ));
    let result = harness.run(CrawlType::NewsArticles).await;

    assert_eq!(result.run.status, RunStatus::Completed);
    assert_eq!(result.run.source, "multi");
    assert_eq!(result.run.sources_failed, 1);
    assert_eq!(result.run.items_processed, 2);
    assert_eq!(result.reports.len(), 2);
    assert_eq!(result.reports[0].source, "down");
}

#[tokio::test]
async fn test_transformer_failure_keeps_raw_fields() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/tim-van-ban"))
        .and(query_param("page", "1"))
        .respond_with(html_page(
            r#"<div class="item-row">
                <a class="title" href="/van-ban/nghi-dinh-46.aspx">Nghị định 46/2023/NĐ-CP quy định chi tiết</a>
                <p class="trich-yeu">Quy định về bảo hiểm</p>
            </div>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/van-ban/nghi-dinh-46.aspx"))
        .respond_with(html_page(
            r#"<div class="noi-dung"><p>Điều 1. Nghị định này quy định chi tiết Luật Kinh doanh bảo hiểm.</p></div>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream unavailable"))
        .expect(1)
        .mount(&server)
        .await;

    let harness = Harness::new(&format!(
        "{}\n[ingest]\nai-rewrite-enabled = true\ntransformer-endpoint = \"{}/v1\"\napi-key-env = \"INSURWATCH_TEST_KEY_UNSET\"\n{}detail-fetch = \"always\"\n",
        crawler_section(0),
        base,
        legal_source(&base, 1)
    ));
    let result = harness.run(CrawlType::LegalDocs).await;

    assert_eq!(result.run.status, RunStatus::Completed);
    assert_eq!(result.run.items_processed, 1);
    assert_eq!(result.ingest.failed, 0);

    let document = harness
        .with_storage(|s| s.get_legal_document("46/2023/NĐ-CP"))
        .unwrap()
        .expect("Document should be stored")
        .document;
    assert_eq!(document.content_summary.as_deref(), Some("Quy định về bảo hiểm"));
    assert!(document.key_changes.is_empty());
}

#[tokio::test]
async fn test_cancelled_run_is_recorded_as_failed() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/bao-hiem.chn"))
        .respond_with(html_page(&mixed_category()))
        .expect(0)
        .mount(&server)
        .await;

    let harness = Harness::new(&format!(
        "{}\n[filter]\n{}\n{}",
        crawler_section(0),
        KEYWORDS,
        news_source("cafef", &base, &["/bao-hiem.chn"])
    ));

    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = harness.run_with(CrawlType::NewsArticles, &cancel).await;

    assert_eq!(result.run.status, RunStatus::Failed);
    assert_eq!(
        result.run.error_message.as_deref(),
        Some("Cancelled before any source completed")
    );
    assert_eq!(harness.with_storage(|s| s.count_articles()).unwrap(), 0);
}

#[tokio::test]
async fn test_runs_are_persisted_in_terminal_state() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/bao-hiem.chn"))
        .respond_with(html_page(&mixed_category()))
        .mount(&server)
        .await;

    let harness = Harness::new(&format!(
        "{}\n[filter]\n{}\n{}",
        crawler_section(0),
        KEYWORDS,
        news_source("cafef", &base, &["/bao-hiem.chn"])
    ));

    let first = harness.run(CrawlType::NewsArticles).await;
    let cancel = CancellationToken::new();
    cancel.cancel();
    let second = harness.run_with(CrawlType::NewsArticles, &cancel).await;

    let stored = harness
        .with_storage(|s| s.get_crawl_run(first.run.id.unwrap()))
        .unwrap();
    assert_eq!(stored.status, RunStatus::Completed);
    assert!(stored.completed_at.is_some());
    assert!(stored.items_processed <= stored.items_found);

    let stats = harness.with_storage(|s| load_statistics(s, 10)).unwrap();
    assert_eq!(stats.total_runs(), 2);
    assert_eq!(stats.articles, 2);
    assert_eq!(stats.runs_by_status.get(&RunStatus::Completed), Some(&1));
    assert_eq!(stats.runs_by_status.get(&RunStatus::Failed), Some(&1));
    assert_eq!(stats.recent_runs[0].id, second.run.id);
    assert!(stats.recent_runs.iter().all(|run| run.is_terminal()));
}

#[tokio::test]
async fn test_legal_detail_skipped_when_listing_has_summary() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/tim-van-ban"))
        .and(query_param("page", "1"))
        .respond_with(html_page(
            r#"<div class="item-row">
                <a class="title" href="/van-ban/thong-tu-67.aspx">Thông tư 67/2023/TT-BTC hướng dẫn Luật</a>
                <p class="trich-yeu">Hướng dẫn thi hành Luật Kinh doanh bảo hiểm</p>
            </div>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/van-ban/thong-tu-67.aspx"))
        .respond_with(html_page(r#"<div class="noi-dung"><p>Điều 1.</p></div>"#))
        .expect(0)
        .mount(&server)
        .await;

    let harness = Harness::new(&format!("{}\n{}", crawler_section(0), legal_source(&base, 1)));
    let result = harness.run(CrawlType::LegalDocs).await;

    assert_eq!(result.run.status, RunStatus::Completed);
    assert_eq!(result.run.items_processed, 1);

    let document = harness
        .with_storage(|s| s.get_legal_document("67/2023/TT-BTC"))
        .unwrap()
        .expect("Document should be stored")
        .document;
    assert_eq!(
        document.content_summary.as_deref(),
        Some("Hướng dẫn thi hành Luật Kinh doanh bảo hiểm")
    );
    assert!(document.content_full.is_none());
}

#[tokio::test]
async fn test_run_timeout_keeps_finished_sources() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/bao-hiem.chn"))
        .respond_with(html_page(&mixed_category()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/cham.chn"))
        .respond_with(
            html_page(&story("/tin/bao-hiem-cham.chn", "Bảo hiểm đến muộn", "Chậm"))
                .set_delay(Duration::from_secs(4)),
        )
        .mount(&server)
        .await;

    let harness = Harness::new(&format!(
        "{}\n[filter]\n{}\n{}\n{}",
        crawler_section(0).replace("run-timeout-secs = 30", "run-timeout-secs = 1"),
        KEYWORDS,
        news_source("cafef", &base, &["/bao-hiem.chn"]),
        news_source("slow", &base, &["/cham.chn"])
    ));

    let started = Instant::now();
    let result = harness.run(CrawlType::NewsArticles).await;

    assert!(started.elapsed() < Duration::from_secs(4));
    assert_eq!(result.run.status, RunStatus::Completed);
    assert!(result.run.partial);
    assert_eq!(result.run.items_found, 2);
    assert_eq!(result.run.items_processed, 2);
    assert_eq!(result.run.sources_failed, 0);

    let slow_url = format!("{}/tin/bao-hiem-cham.chn", base);
    assert!(harness
        .with_storage(|s| s.get_article_by_url(&slow_url))
        .unwrap()
        .is_none());

    let stored = harness
        .with_storage(|s| s.get_crawl_run(result.run.id.unwrap()))
        .unwrap();
    assert_eq!(stored.status, RunStatus::Completed);
    assert!(stored.partial);
}
