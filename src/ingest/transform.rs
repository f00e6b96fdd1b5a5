//! Rewriting and summarization collaborator
//!
//! The gate treats this as an opaque request/response function that may fail. The chat
//! implementation talks to any OpenAI-compatible `/chat/completions` endpoint and asks
//! for a JSON object back.

use crate::config::IngestConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

const NEWS_SYSTEM_PROMPT: &str = "Bạn là phóng viên chuyên ngành bảo hiểm. Viết lại bài báo \
    bằng tiếng Việt, khách quan, không sao chép nguyên văn. Trả về JSON với các khóa: \
    rewritten_title, lead_paragraph, analysis_section, impact_section, conclusion, \
    meta_description, tags (mảng chuỗi), disclaimer (chuỗi hoặc null).";

const LEGAL_SYSTEM_PROMPT: &str = "Bạn là chuyên gia pháp chế ngành bảo hiểm. Tóm tắt văn bản \
    pháp luật thành bản tin chính sách. Trả về JSON với các khóa: policy_brief_title, \
    executive_summary, key_changes (mảng chuỗi), affected_parties (đối tượng).";

/// Longest excerpt of a document sent for summarization
const MAX_PROMPT_CHARS: usize = 12_000;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("Transformer request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Transformer API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Malformed transformer response: {0}")]
    Malformed(String),

    #[error("Transformation is disabled")]
    Disabled,
}

/// A rewritten news article
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleRewrite {
    pub title: String,
    pub content_html: String,
    pub summary: String,
    pub tags: Vec<String>,
    pub has_disclaimer: bool,
}

/// A policy brief of a legal document
#[derive(Debug, Clone, PartialEq)]
pub struct LegalSummary {
    pub brief_title: String,
    pub executive_summary: String,
    pub key_changes: Vec<String>,
    pub affected_parties: Value,
}

#[async_trait]
pub trait Transformer: Send + Sync {
    async fn rewrite_article(
        &self,
        raw_text: &str,
        title: &str,
        source: &str,
    ) -> Result<ArticleRewrite, TransformError>;

    async fn summarize_legal_doc(
        &self,
        title: &str,
        content: &str,
        doc_number: &str,
    ) -> Result<LegalSummary, TransformError>;
}

/// Always fails with `Disabled`; callers keep the raw fields
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledTransformer;

#[async_trait]
impl Transformer for DisabledTransformer {
    async fn rewrite_article(
        &self,
        _raw_text: &str,
        _title: &str,
        _source: &str,
    ) -> Result<ArticleRewrite, TransformError> {
        Err(TransformError::Disabled)
    }

    async fn summarize_legal_doc(
        &self,
        _title: &str,
        _content: &str,
        _doc_number: &str,
    ) -> Result<LegalSummary, TransformError> {
        Err(TransformError::Disabled)
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RewritePayload {
    rewritten_title: Option<String>,
    lead_paragraph: String,
    analysis_section: String,
    impact_section: String,
    conclusion: String,
    meta_description: String,
    tags: Vec<String>,
    disclaimer: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LegalPayload {
    policy_brief_title: Option<String>,
    executive_summary: String,
    key_changes: Vec<Value>,
    affected_parties: Value,
}

/// OpenAI-compatible chat-completions client
pub struct ChatTransformer {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl ChatTransformer {
    pub fn new(
        endpoint: &str,
        model: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, TransformError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
        })
    }

    /// Builds a client from the ingest section, reading the key from its env variable
    ///
    /// Returns `None` when no endpoint is configured.
    pub fn from_config(config: &IngestConfig) -> Result<Option<Self>, TransformError> {
        let Some(endpoint) = config.transformer_endpoint.as_deref() else {
            return Ok(None);
        };
        let api_key = std::env::var(&config.api_key_env).ok();
        if api_key.is_none() {
            warn!(env = %config.api_key_env, "Transformer API key not set, sending unauthenticated requests");
        }
        Self::new(
            endpoint,
            &config.transformer_model,
            api_key,
            Duration::from_secs(config.transformer_timeout_secs),
        )
        .map(Some)
    }

    async fn complete(
        &self,
        system: &str,
        user: String,
        temperature: f32,
    ) -> Result<String, TransformError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.endpoint))
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(TransformError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| TransformError::Malformed(e.to_string()))?;
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| TransformError::Malformed("no choices in response".to_string()))
    }
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

fn value_to_line(value: Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s),
        Value::Null | Value::String(_) => None,
        other => Some(other.to_string()),
    }
}

fn render_article_html(payload: &RewritePayload) -> String {
    let mut html = String::from("<div class=\"article-content\">\n");
    html.push_str(&format!(
        "<p class=\"lead-paragraph\">{}</p>\n",
        payload.lead_paragraph
    ));
    if !payload.analysis_section.is_empty() {
        html.push_str(&format!("<h2>Phân tích</h2>\n{}\n", payload.analysis_section));
    }
    if !payload.impact_section.is_empty() {
        html.push_str(&format!("<h2>Tác động</h2>\n{}\n", payload.impact_section));
    }
    if let Some(disclaimer) = payload.disclaimer.as_deref().filter(|d| !d.is_empty()) {
        html.push_str(&format!(
            "<div class=\"disclaimer alert\">{}</div>\n",
            disclaimer
        ));
    }
    if !payload.conclusion.is_empty() {
        html.push_str(&format!(
            "<p><strong>{}</strong></p>\n",
            payload.conclusion
        ));
    }
    html.push_str("</div>");
    html
}

/// Parses a rewrite reply; missing keys fall back to the original title
pub fn parse_article_rewrite(reply: &str, title: &str) -> Result<ArticleRewrite, TransformError> {
    let payload: RewritePayload =
        serde_json::from_str(reply).map_err(|e| TransformError::Malformed(e.to_string()))?;
    if payload.lead_paragraph.trim().is_empty() && payload.analysis_section.trim().is_empty() {
        return Err(TransformError::Malformed(
            "rewrite has no body".to_string(),
        ));
    }

    Ok(ArticleRewrite {
        title: payload
            .rewritten_title
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| title.to_string()),
        content_html: render_article_html(&payload),
        has_disclaimer: payload.disclaimer.as_deref().is_some_and(|d| !d.is_empty()),
        summary: payload.meta_description,
        tags: payload.tags,
    })
}

/// Parses a legal summary reply
pub fn parse_legal_summary(reply: &str, doc_number: &str) -> Result<LegalSummary, TransformError> {
    let payload: LegalPayload =
        serde_json::from_str(reply).map_err(|e| TransformError::Malformed(e.to_string()))?;
    if payload.executive_summary.trim().is_empty() {
        return Err(TransformError::Malformed(
            "summary has no executive_summary".to_string(),
        ));
    }

    Ok(LegalSummary {
        brief_title: payload
            .policy_brief_title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| format!("[Mới] {}", doc_number)),
        executive_summary: payload.executive_summary,
        key_changes: payload
            .key_changes
            .into_iter()
            .filter_map(value_to_line)
            .collect(),
        affected_parties: payload.affected_parties,
    })
}

#[async_trait]
impl Transformer for ChatTransformer {
    async fn rewrite_article(
        &self,
        raw_text: &str,
        title: &str,
        source: &str,
    ) -> Result<ArticleRewrite, TransformError> {
        let prompt = format!(
            "Nguồn: {}\nTiêu đề gốc: {}\n\nNội dung gốc:\n{}",
            source,
            title,
            truncate_chars(raw_text, MAX_PROMPT_CHARS)
        );
        let reply = self.complete(NEWS_SYSTEM_PROMPT, prompt, 0.7).await?;
        debug!(title, reply_len = reply.len(), "Article rewrite received");
        parse_article_rewrite(&reply, title)
    }

    async fn summarize_legal_doc(
        &self,
        title: &str,
        content: &str,
        doc_number: &str,
    ) -> Result<LegalSummary, TransformError> {
        let prompt = format!(
            "Số hiệu: {}\nTiêu đề: {}\n\nNội dung:\n{}",
            doc_number,
            title,
            truncate_chars(content, MAX_PROMPT_CHARS)
        );
        let reply = self.complete(LEGAL_SYSTEM_PROMPT, prompt, 0.3).await?;
        debug!(doc_number, reply_len = reply.len(), "Legal summary received");
        parse_legal_summary(&reply, doc_number)
    }
}
