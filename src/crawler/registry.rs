//! Registry of configured sources
//!
//! Adding a source is a configuration change; the registry only selects and adjusts
//! entries for a run.

use crate::config::{Config, SourceConfig, SourceKind};
use crate::crawler::parser::ExtractionStrategy;
use crate::state::CrawlType;
use crate::ConfigError;
use std::sync::Arc;

/// Per-run adjustments coming from the command line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceOverrides {
    /// Replaces `max-pages` of legal sources
    pub legal_pages: Option<u32>,
    /// Replaces `max-items` of news sources
    pub news_max: Option<u32>,
    /// Restricts the run to one source by name
    pub only: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SourceRegistry {
    sources: Vec<SourceConfig>,
}

impl SourceRegistry {
    pub fn new(sources: Vec<SourceConfig>) -> Self {
        Self { sources }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.sources.clone())
    }

    pub fn get(&self, name: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Sources of one kind, in configuration order
    pub fn by_kind(&self, kind: SourceKind) -> impl Iterator<Item = &SourceConfig> {
        self.sources.iter().filter(move |s| s.kind == kind)
    }

    /// Sources for a crawl type with the overrides applied
    pub fn select(&self, crawl_type: CrawlType, overrides: &SourceOverrides) -> Vec<SourceConfig> {
        self.by_kind(kind_for(crawl_type))
            .filter(|s| overrides.only.as_deref().map_or(true, |only| s.name == only))
            .cloned()
            .map(|mut source| {
                match source.kind {
                    SourceKind::Legal => {
                        if let Some(pages) = overrides.legal_pages {
                            source.max_pages = pages.max(1);
                        }
                    }
                    SourceKind::News => {
                        if let Some(max) = overrides.news_max {
                            source.max_items = Some(max.max(1));
                        }
                    }
                }
                source
            })
            .collect()
    }

    /// Compiles the extraction strategies of the selected sources
    pub fn strategies(
        &self,
        crawl_type: CrawlType,
        overrides: &SourceOverrides,
    ) -> Result<Vec<(SourceConfig, Arc<ExtractionStrategy>)>, ConfigError> {
        self.select(crawl_type, overrides)
            .into_iter()
            .map(|source| {
                let strategy = ExtractionStrategy::compile(&source)?;
                Ok((source, Arc::new(strategy)))
            })
            .collect()
    }
}

/// The kind of source a crawl type reads from
pub fn kind_for(crawl_type: CrawlType) -> SourceKind {
    match crawl_type {
        CrawlType::LegalDocs => SourceKind::Legal,
        CrawlType::NewsArticles => SourceKind::News,
    }
}
