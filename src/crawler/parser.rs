//! Declarative extraction of candidates from listing and detail pages
//!
//! Each source carries a selector map; an [`ExtractionStrategy`] is that map compiled once
//! and applied to every page of the source:
//! - one candidate per matched item container
//! - items without a title or a usable link are skipped, never the whole page
//! - relative links and images are resolved against the source's base URL
//! - detail pages, when configured, fill in the full-content fields

use crate::config::{DetailFetch, DetailSelectors, SelectorMap, SourceConfig, SourceKind};
use crate::crawler::candidate::{
    CandidateDetails, DocStatus, LegalFields, NewsFields, RawCandidate,
};
use crate::crawler::dedup::canonical_doc_number;
use crate::crawler::fetcher::{FetchError, RenderedPage, Transport};
use crate::url::resolve_link;
use crate::ConfigError;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;
use tracing::debug;
use url::Url;

/// Length of the abstract derived from a document's full text
const ABSTRACT_CHARS: usize = 500;

/// Elements stripped from stored HTML
const NOISE_SELECTOR: &str = "script, style, iframe, noscript, .ads, .advertisement, .tracking";

/// Document types recognized at the start of a title when no type is given
const KNOWN_DOC_TYPES: &[&str] = &[
    "Nghị định",
    "Thông tư",
    "Công văn",
    "Quyết định",
    "Nghị quyết",
    "Luật",
    "Chỉ thị",
];

const DATE_FORMATS: &[&str] = &["%d/%m/%Y", "%d-%m-%Y", "%Y-%m-%d"];
const DATETIME_FORMATS: &[&str] = &["%d/%m/%Y %H:%M", "%d-%m-%Y %H:%M:%S"];

/// A source's selector map, compiled
#[derive(Debug)]
pub struct ExtractionStrategy {
    source_name: String,
    display_name: String,
    kind: SourceKind,
    base_url: Url,
    is_company: bool,
    detail_fetch: DetailFetch,
    item: Selector,
    title: Selector,
    link: Option<Selector>,
    summary: Option<Selector>,
    image: Option<Selector>,
    doc_number: Option<Selector>,
    issue_date: Option<Selector>,
    doc_type: Option<Selector>,
    detail: Option<DetailStrategy>,
}

#[derive(Debug, Default)]
struct DetailStrategy {
    title: Option<Selector>,
    doc_number: Option<Selector>,
    doc_type: Option<Selector>,
    issuing_body: Option<Selector>,
    signer: Option<Selector>,
    issue_date: Option<Selector>,
    effective_date: Option<Selector>,
    status: Option<Selector>,
    abstract_text: Option<Selector>,
    content: Option<Selector>,
    pdf_link: Option<Selector>,
    tags: Option<Selector>,
}

fn compile(selector: &str, source: &str) -> Result<Selector, ConfigError> {
    Selector::parse(selector).map_err(|_| ConfigError::InvalidSelector {
        source_name: source.to_string(),
        selector: selector.to_string(),
    })
}

fn compile_opt(selector: Option<&String>, source: &str) -> Result<Option<Selector>, ConfigError> {
    selector.map(|s| compile(s, source)).transpose()
}

impl DetailStrategy {
    fn compile(selectors: &DetailSelectors, source: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            title: compile_opt(selectors.title.as_ref(), source)?,
            doc_number: compile_opt(selectors.doc_number.as_ref(), source)?,
            doc_type: compile_opt(selectors.doc_type.as_ref(), source)?,
            issuing_body: compile_opt(selectors.issuing_body.as_ref(), source)?,
            signer: compile_opt(selectors.signer.as_ref(), source)?,
            issue_date: compile_opt(selectors.issue_date.as_ref(), source)?,
            effective_date: compile_opt(selectors.effective_date.as_ref(), source)?,
            status: compile_opt(selectors.status.as_ref(), source)?,
            abstract_text: compile_opt(selectors.abstract_text.as_ref(), source)?,
            content: compile_opt(selectors.content.as_ref(), source)?,
            pdf_link: compile_opt(selectors.pdf_link.as_ref(), source)?,
            tags: compile_opt(selectors.tags.as_ref(), source)?,
        })
    }
}

impl ExtractionStrategy {
    /// Compiles the selectors of a source
    ///
    /// # Returns
    ///
    /// * `Ok(ExtractionStrategy)` - Every selector compiled
    /// * `Err(ConfigError)` - A selector or the base URL is invalid
    pub fn compile(source: &SourceConfig) -> Result<Self, ConfigError> {
        let name = source.name.as_str();
        let SelectorMap {
            item,
            title,
            link,
            summary,
            image,
            doc_number,
            issue_date,
            doc_type,
        } = &source.selectors;

        let base_url = Url::parse(&source.base_url).map_err(|e| {
            ConfigError::InvalidUrl(format!("Source '{}' base-url: {}", name, e))
        })?;

        Ok(Self {
            source_name: source.name.clone(),
            display_name: source.display_name.clone(),
            kind: source.kind,
            base_url,
            is_company: source.is_company,
            detail_fetch: source.detail_fetch(),
            item: compile(item, name)?,
            title: compile(title, name)?,
            link: compile_opt(link.as_ref(), name)?,
            summary: compile_opt(summary.as_ref(), name)?,
            image: compile_opt(image.as_ref(), name)?,
            doc_number: compile_opt(doc_number.as_ref(), name)?,
            issue_date: compile_opt(issue_date.as_ref(), name)?,
            doc_type: compile_opt(doc_type.as_ref(), name)?,
            detail: source
                .detail_selectors
                .as_ref()
                .map(|d| DetailStrategy::compile(d, name))
                .transpose()?,
        })
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Extracts every well-formed item of a listing page
    pub fn extract(&self, page: &RenderedPage) -> Vec<RawCandidate> {
        let document = Html::parse_document(&page.html);
        let mut candidates = Vec::new();

        for (index, item) in document.select(&self.item).enumerate() {
            match self.extract_item(item) {
                Some(candidate) => candidates.push(candidate),
                None => debug!(
                    source = %self.source_name,
                    url = %page.url,
                    index,
                    "Skipping item without title, link or document number"
                ),
            }
        }

        candidates
    }

    fn extract_item(&self, item: ElementRef<'_>) -> Option<RawCandidate> {
        let title_elem = item.select(&self.title).next()?;
        let title = title_elem
            .value()
            .attr("title")
            .map(collapse_whitespace)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| element_text(title_elem));
        if title.is_empty() {
            return None;
        }

        let link_elem = match &self.link {
            Some(selector) => item.select(selector).next()?,
            None => title_elem,
        };
        let href = link_elem
            .value()
            .attr("href")
            .or_else(|| first_descendant_href(link_elem))?;
        let link = resolve_link(href, &self.base_url)?;

        let summary = select_text(item, self.summary.as_ref()).unwrap_or_default();
        let image_url = self
            .image
            .as_ref()
            .and_then(|selector| item.select(selector).next())
            .and_then(|img| {
                img.value()
                    .attr("src")
                    .filter(|s| !s.trim().is_empty() && !s.starts_with("data:"))
                    .or_else(|| img.value().attr("data-src"))
            })
            .and_then(|src| resolve_link(src, &self.base_url));

        let (identity_key, details) = match self.kind {
            SourceKind::Legal => {
                let declared = select_text(item, self.doc_number.as_ref());
                let doc_number = canonical_doc_number(declared.as_deref(), &title)?;
                let doc_type = select_text(item, self.doc_type.as_ref())
                    .or_else(|| infer_doc_type(&title));
                let issue_date = select_text(item, self.issue_date.as_ref())
                    .and_then(|text| parse_vietnamese_date(&text));

                (
                    doc_number.clone(),
                    CandidateDetails::Legal(LegalFields {
                        doc_number,
                        doc_type,
                        issue_date,
                        ..LegalFields::default()
                    }),
                )
            }
            SourceKind::News => (
                link.clone(),
                CandidateDetails::News(NewsFields {
                    is_company_source: self.is_company,
                    content_html: None,
                }),
            ),
        };

        Some(RawCandidate {
            identity_key,
            title,
            summary,
            link,
            image_url,
            source_name: self.source_name.clone(),
            source_display_name: self.display_name.clone(),
            extracted_at: Utc::now(),
            details,
        })
    }

    /// Returns true if the candidate's detail page should be fetched
    pub fn needs_detail(&self, candidate: &RawCandidate) -> bool {
        if self.detail.is_none() {
            return false;
        }
        match self.detail_fetch {
            DetailFetch::Never => false,
            DetailFetch::MissingSummary => candidate.summary.trim().is_empty(),
            DetailFetch::Always => true,
        }
    }

    /// Fetches the candidate's detail page and fills in the full-content fields
    ///
    /// On error the candidate is left as extracted from the listing.
    pub async fn enrich_with_detail(
        &self,
        transport: &dyn Transport,
        candidate: &mut RawCandidate,
    ) -> Result<(), FetchError> {
        let page = transport.fetch(&candidate.link).await?;
        self.apply_detail(&page.html, candidate);
        Ok(())
    }

    /// Applies the detail selectors to a fetched detail page
    ///
    /// Listing values win over detail values for the title, the document number and
    /// the issue date.
    pub fn apply_detail(&self, html: &str, candidate: &mut RawCandidate) {
        let Some(detail) = &self.detail else {
            return;
        };
        let document = Html::parse_document(html);
        let root = document.root_element();

        if candidate.title.is_empty() {
            if let Some(title) = select_text(root, detail.title.as_ref()) {
                candidate.title = title;
            }
        }

        let content_elem = detail
            .content
            .as_ref()
            .and_then(|selector| root.select(selector).next());
        let content_html = content_elem.map(|elem| clean_html_content(&elem.html()));
        let content_text = content_html.as_deref().map(html_text).unwrap_or_default();

        if candidate.summary.trim().is_empty() {
            let summary = select_text(root, detail.abstract_text.as_ref())
                .unwrap_or_else(|| abstract_from_text(&content_text));
            candidate.summary = summary;
        }

        match &mut candidate.details {
            CandidateDetails::Legal(fields) => {
                if fields.doc_type.is_none() {
                    fields.doc_type = select_text(root, detail.doc_type.as_ref());
                }
                fields.issuing_body = select_text(root, detail.issuing_body.as_ref());
                fields.signer = select_text(root, detail.signer.as_ref());
                if fields.issue_date.is_none() {
                    fields.issue_date = select_text(root, detail.issue_date.as_ref())
                        .and_then(|text| parse_vietnamese_date(&text));
                }
                fields.effective_date = select_text(root, detail.effective_date.as_ref())
                    .and_then(|text| parse_vietnamese_date(&text));
                fields.status = select_text(root, detail.status.as_ref())
                    .map(|text| DocStatus::parse(&text))
                    .unwrap_or_default();
                fields.content_full = content_html;
                fields.pdf_url = detail
                    .pdf_link
                    .as_ref()
                    .and_then(|selector| root.select(selector).next())
                    .and_then(|a| a.value().attr("href"))
                    .and_then(|href| resolve_link(href, &self.base_url));
                fields.tags = detail
                    .tags
                    .as_ref()
                    .map(|selector| {
                        root.select(selector)
                            .map(element_text)
                            .filter(|t| !t.is_empty())
                            .collect()
                    })
                    .unwrap_or_default();

                if let Some(found) = select_text(root, detail.doc_number.as_ref()) {
                    if found != fields.doc_number {
                        debug!(
                            listing = %fields.doc_number,
                            detail = %found,
                            "Detail page reports a different document number, keeping listing value"
                        );
                    }
                }
            }
            CandidateDetails::News(fields) => {
                fields.content_html = content_html;
            }
        }
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Text content of an element with whitespace collapsed
fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

/// Text of an HTML fragment with whitespace collapsed
fn html_text(html: &str) -> String {
    element_text(Html::parse_fragment(html).root_element())
}

fn select_text(scope: ElementRef<'_>, selector: Option<&Selector>) -> Option<String> {
    let selector = selector?;
    scope
        .select(selector)
        .next()
        .map(element_text)
        .filter(|t| !t.is_empty())
}

fn first_descendant_href(element: ElementRef<'_>) -> Option<&str> {
    static ANCHOR: OnceLock<Option<Selector>> = OnceLock::new();
    let anchor = ANCHOR.get_or_init(|| Selector::parse("a[href]").ok()).as_ref()?;
    element
        .select(anchor)
        .next()
        .and_then(|a| a.value().attr("href"))
}

/// First 500 characters of a text, with an ellipsis when cut
fn abstract_from_text(text: &str) -> String {
    if text.chars().count() > ABSTRACT_CHARS {
        let head: String = text.chars().take(ABSTRACT_CHARS).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

/// Guesses the document type from the leading words of a title
pub fn infer_doc_type(title: &str) -> Option<String> {
    let lower = title.trim().to_lowercase();
    KNOWN_DOC_TYPES
        .iter()
        .find(|t| lower.starts_with(&t.to_lowercase()))
        .map(|t| t.to_string())
}

/// Parses the date formats used by Vietnamese legal and news sites
///
/// Accepts `dd/mm/yyyy`, `dd-mm-yyyy`, `yyyy-mm-dd`, `dd/mm/yyyy HH:MM` and
/// `dd-mm-yyyy HH:MM:SS`, either as the whole text or embedded in a label such as
/// "Ngày ban hành: 15/03/2024".
pub fn parse_vietnamese_date(text: &str) -> Option<NaiveDate> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Some(date) = parse_date_exact(trimmed) {
        return Some(date);
    }

    static TOKEN: OnceLock<Option<Regex>> = OnceLock::new();
    let token = TOKEN
        .get_or_init(|| {
            Regex::new(r"\d{1,4}[/-]\d{1,2}[/-]\d{1,4}(?: \d{1,2}:\d{2}(?::\d{2})?)?").ok()
        })
        .as_ref()?;

    token
        .find_iter(trimmed)
        .find_map(|m| parse_date_exact(m.as_str()))
}

fn parse_date_exact(text: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
                .map(|dt| dt.date())
        })
}

/// Removes scripts, styles, frames and ad blocks from an HTML fragment
pub fn clean_html_content(html: &str) -> String {
    let Ok(noise) = Selector::parse(NOISE_SELECTOR) else {
        return html.to_string();
    };

    let mut fragment = Html::parse_fragment(html);
    let ids: Vec<_> = fragment.select(&noise).map(|element| element.id()).collect();
    for id in ids {
        if let Some(mut node) = fragment.tree.get_mut(id) {
            node.detach();
        }
    }

    fragment.root_element().inner_html().trim().to_string()
}
