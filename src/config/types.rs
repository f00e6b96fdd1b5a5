use serde::Deserialize;

/// Main configuration structure for Insurwatch
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    pub transport: TransportConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default, rename = "source")]
    pub sources: Vec<SourceConfig>,
}

/// Crawl pacing, retry and concurrency configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Politeness delay applied after every successful fetch (milliseconds)
    #[serde(rename = "request-delay-ms")]
    pub request_delay_ms: u64,

    /// Base backoff before a retry; the n-th retry waits `base * n` (milliseconds)
    #[serde(rename = "retry-base-delay-ms")]
    pub retry_base_delay_ms: u64,

    /// Retries after the first failed attempt
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Per-request timeout (seconds)
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,

    /// Minimum spacing between any two requests across all workers (milliseconds)
    #[serde(rename = "min-request-interval-ms", default)]
    pub min_request_interval_ms: u64,

    /// Maximum number of sources crawled concurrently
    #[serde(rename = "max-concurrent-sources")]
    pub max_concurrent_sources: u32,

    /// Lower bound of the randomized delay between source dispatches (milliseconds)
    #[serde(rename = "inter-source-delay-min-ms", default)]
    pub inter_source_delay_min_ms: u64,

    /// Upper bound of the randomized delay between source dispatches (milliseconds)
    #[serde(rename = "inter-source-delay-max-ms", default)]
    pub inter_source_delay_max_ms: u64,

    /// Overall wall-clock budget for one crawl run (seconds)
    #[serde(rename = "run-timeout-secs", default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,
}

fn default_run_timeout_secs() -> u64 {
    1800
}

/// Which transport implementation fetches pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RendererKind {
    /// Plain HTTP client, no JavaScript execution
    Http,
    /// Scripted-browser renderer behind a Browserless-style `/content` endpoint
    Browser,
}

/// Transport configuration (user agents, proxies, renderer)
#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    pub renderer: RendererKind,

    /// Pool of user agents; one is picked per request
    #[serde(rename = "user-agents")]
    pub user_agents: Vec<String>,

    /// Optional upstream proxies, rotated per request
    #[serde(default)]
    pub proxies: Vec<String>,

    #[serde(rename = "accept-language", default = "default_accept_language")]
    pub accept_language: String,

    /// Base URL of the rendering service
    #[serde(rename = "browser-endpoint", default)]
    pub browser_endpoint: Option<String>,

    #[serde(rename = "browser-token", default)]
    pub browser_token: Option<String>,

    /// Lower bound of the human-like pause after a browser render (milliseconds)
    #[serde(rename = "pause-min-ms", default)]
    pub pause_min_ms: u64,

    /// Upper bound of the human-like pause after a browser render (milliseconds)
    #[serde(rename = "pause-max-ms", default)]
    pub pause_max_ms: u64,
}

fn default_accept_language() -> String {
    "vi-VN,vi;q=0.9,en-US;q=0.8,en;q=0.7".to_string()
}

/// Ingestion and transformation settings
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Route candidates through the rewriting/summarization collaborator
    #[serde(rename = "ai-rewrite-enabled", default)]
    pub ai_rewrite_enabled: bool,

    /// Legal documents whose abstract is shorter than this are summarized
    #[serde(rename = "min-summary-length", default = "default_min_summary_length")]
    pub min_summary_length: usize,

    /// News articles are rewritten only when their body reaches this length
    #[serde(rename = "min-content-length", default = "default_min_content_length")]
    pub min_content_length: usize,

    /// Publish articles immediately instead of storing them as drafts
    #[serde(rename = "auto-publish", default)]
    pub auto_publish: bool,

    /// OpenAI-compatible API base URL
    #[serde(rename = "transformer-endpoint", default)]
    pub transformer_endpoint: Option<String>,

    #[serde(rename = "transformer-model", default = "default_transformer_model")]
    pub transformer_model: String,

    /// Environment variable holding the API key
    #[serde(rename = "api-key-env", default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(rename = "transformer-timeout-secs", default = "default_transformer_timeout")]
    pub transformer_timeout_secs: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            ai_rewrite_enabled: false,
            min_summary_length: default_min_summary_length(),
            min_content_length: default_min_content_length(),
            auto_publish: false,
            transformer_endpoint: None,
            transformer_model: default_transformer_model(),
            api_key_env: default_api_key_env(),
            transformer_timeout_secs: default_transformer_timeout(),
        }
    }
}

fn default_min_summary_length() -> usize {
    100
}

fn default_min_content_length() -> usize {
    100
}

fn default_transformer_model() -> String {
    "gpt-4o".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_transformer_timeout() -> u64 {
    60
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// Relevance keywords shared by every source with filtering enabled
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilterConfig {
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// The kind of records a source yields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    Legal,
    News,
}

/// When the detail page of an item is fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetailFetch {
    Never,
    /// Only for items whose preview carries no summary
    MissingSummary,
    Always,
}

/// What to do with legal documents outside the priority document types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PriorityPolicy {
    /// Keep every document
    #[default]
    KeepAll,
    /// Keep only priority types and documents still in force
    Strict,
    /// Like `Strict`, but keep everything when nothing matches
    FallbackToAll,
}

/// A crawl source: where to fetch and how to extract
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Stable identifier (e.g., "cafef")
    pub name: String,

    #[serde(rename = "display-name")]
    pub display_name: String,

    pub kind: SourceKind,

    /// Origin used to resolve relative links
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Category URLs (news) or the search endpoint (legal)
    pub targets: Vec<String>,

    /// Topic queries for search-driven sources
    #[serde(default)]
    pub queries: Vec<String>,

    /// Result pages walked per query
    #[serde(rename = "max-pages", default = "default_max_pages")]
    pub max_pages: u32,

    /// Upper bound on queries walked
    #[serde(rename = "max-queries", default)]
    pub max_queries: Option<u32>,

    /// Upper bound on accepted candidates for this source
    #[serde(rename = "max-items", default)]
    pub max_items: Option<u32>,

    /// Company press-release site rather than a news aggregator
    #[serde(rename = "is-company", default)]
    pub is_company: bool,

    /// Keyword filtering; defaults to on for news and off for legal searches
    #[serde(rename = "relevance-filter", default)]
    pub relevance_filter: Option<bool>,

    /// When detail pages are fetched; defaults to `missing-summary` for legal and
    /// `always` for news
    #[serde(rename = "detail-fetch", default)]
    pub detail_fetch: Option<DetailFetch>,

    #[serde(rename = "priority-doc-types", default)]
    pub priority_doc_types: Vec<String>,

    #[serde(rename = "priority-policy", default)]
    pub priority_policy: PriorityPolicy,

    pub selectors: SelectorMap,

    #[serde(rename = "detail-selectors", default)]
    pub detail_selectors: Option<DetailSelectors>,
}

fn default_max_pages() -> u32 {
    1
}

impl SourceConfig {
    /// Returns true if candidates from this source go through the keyword filter
    pub fn filter_enabled(&self) -> bool {
        self.relevance_filter
            .unwrap_or(matches!(self.kind, SourceKind::News))
    }

    /// Returns the detail-fetch mode, falling back to the default of the source kind
    pub fn detail_fetch(&self) -> DetailFetch {
        self.detail_fetch.unwrap_or(match self.kind {
            SourceKind::Legal => DetailFetch::MissingSummary,
            SourceKind::News => DetailFetch::Always,
        })
    }
}

/// Selectors applied to the listing page
#[derive(Debug, Clone, Deserialize)]
pub struct SelectorMap {
    /// Container matched once per item
    pub item: String,
    pub title: String,
    /// Element carrying the href; defaults to the title element
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(rename = "doc-number", default)]
    pub doc_number: Option<String>,
    #[serde(rename = "issue-date", default)]
    pub issue_date: Option<String>,
    #[serde(rename = "doc-type", default)]
    pub doc_type: Option<String>,
}

/// Selectors applied to an item's detail page
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DetailSelectors {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(rename = "doc-number", default)]
    pub doc_number: Option<String>,
    #[serde(rename = "doc-type", default)]
    pub doc_type: Option<String>,
    #[serde(rename = "issuing-body", default)]
    pub issuing_body: Option<String>,
    #[serde(default)]
    pub signer: Option<String>,
    #[serde(rename = "issue-date", default)]
    pub issue_date: Option<String>,
    #[serde(rename = "effective-date", default)]
    pub effective_date: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(rename = "abstract", default)]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(rename = "pdf-link", default)]
    pub pdf_link: Option<String>,
    #[serde(default)]
    pub tags: Option<String>,
}
