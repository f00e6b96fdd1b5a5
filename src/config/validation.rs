use crate::config::types::{
    Config, CrawlerConfig, DetailSelectors, IngestConfig, OutputConfig, RendererKind,
    SourceConfig, SourceKind, TransportConfig,
};
use crate::ConfigError;
use scraper::Selector;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_transport_config(&config.transport)?;
    validate_ingest_config(&config.ingest)?;
    validate_output_config(&config.output)?;
    validate_sources(&config.sources)?;

    if config.sources.iter().any(|s| s.filter_enabled()) && config.filter.keywords.is_empty() {
        return Err(ConfigError::Validation(
            "filter.keywords cannot be empty when a source has relevance filtering enabled"
                .to_string(),
        ));
    }

    if config.filter.keywords.iter().any(|k| k.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "filter.keywords cannot contain blank entries".to_string(),
        ));
    }

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_concurrent_sources < 1 || config.max_concurrent_sources > 32 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_sources must be between 1 and 32, got {}",
            config.max_concurrent_sources
        )));
    }

    if config.max_retries > 10 {
        return Err(ConfigError::Validation(format!(
            "max_retries must be <= 10, got {}",
            config.max_retries
        )));
    }

    if config.timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.run_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "run_timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.inter_source_delay_min_ms > config.inter_source_delay_max_ms {
        return Err(ConfigError::Validation(format!(
            "inter_source_delay_min_ms ({}) exceeds inter_source_delay_max_ms ({})",
            config.inter_source_delay_min_ms, config.inter_source_delay_max_ms
        )));
    }

    Ok(())
}

/// Validates transport configuration
fn validate_transport_config(config: &TransportConfig) -> Result<(), ConfigError> {
    if config.user_agents.is_empty() {
        return Err(ConfigError::Validation(
            "user_agents must contain at least one entry".to_string(),
        ));
    }

    if config.user_agents.iter().any(|ua| ua.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "user_agents cannot contain blank entries".to_string(),
        ));
    }

    for proxy in &config.proxies {
        Url::parse(proxy)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid proxy '{}': {}", proxy, e)))?;
    }

    if config.renderer == RendererKind::Browser {
        let endpoint = config.browser_endpoint.as_deref().ok_or_else(|| {
            ConfigError::Validation(
                "browser_endpoint is required when renderer = \"browser\"".to_string(),
            )
        })?;
        Url::parse(endpoint).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid browser_endpoint '{}': {}", endpoint, e))
        })?;
    }

    if config.pause_min_ms > config.pause_max_ms {
        return Err(ConfigError::Validation(format!(
            "pause_min_ms ({}) exceeds pause_max_ms ({})",
            config.pause_min_ms, config.pause_max_ms
        )));
    }

    Ok(())
}

/// Validates ingestion configuration
fn validate_ingest_config(config: &IngestConfig) -> Result<(), ConfigError> {
    if config.ai_rewrite_enabled {
        let endpoint = config.transformer_endpoint.as_deref().ok_or_else(|| {
            ConfigError::Validation(
                "transformer_endpoint is required when ai_rewrite_enabled = true".to_string(),
            )
        })?;
        Url::parse(endpoint).map_err(|e| {
            ConfigError::InvalidUrl(format!(
                "Invalid transformer_endpoint '{}': {}",
                endpoint, e
            ))
        })?;
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates source entries
fn validate_sources(sources: &[SourceConfig]) -> Result<(), ConfigError> {
    let mut names = HashSet::new();

    for source in sources {
        if source.name.is_empty() {
            return Err(ConfigError::Validation(
                "source name cannot be empty".to_string(),
            ));
        }

        if !names.insert(source.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate source name '{}'",
                source.name
            )));
        }

        validate_http_url(&source.base_url, &source.name, "base-url")?;

        if source.targets.is_empty() {
            return Err(ConfigError::Validation(format!(
                "Source '{}' must have at least one target URL",
                source.name
            )));
        }

        for target in &source.targets {
            validate_http_url(target, &source.name, "target")?;
        }

        if source.kind == SourceKind::Legal && source.queries.is_empty() {
            return Err(ConfigError::Validation(format!(
                "Legal source '{}' must declare at least one query",
                source.name
            )));
        }

        if source.max_pages < 1 {
            return Err(ConfigError::Validation(format!(
                "Source '{}': max_pages must be >= 1",
                source.name
            )));
        }

        if source.max_items == Some(0) || source.max_queries == Some(0) {
            return Err(ConfigError::Validation(format!(
                "Source '{}': max_items and max_queries must be >= 1 when set",
                source.name
            )));
        }

        validate_source_selectors(source)?;
    }

    Ok(())
}

/// Validates that a URL parses and uses an HTTP(S) scheme
fn validate_http_url(raw: &str, source: &str, field: &str) -> Result<(), ConfigError> {
    let url = Url::parse(raw).map_err(|e| {
        ConfigError::InvalidUrl(format!("Source '{}' {} '{}': {}", source, field, raw, e))
    })?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "Source '{}' {} '{}' must use HTTP or HTTPS",
            source, field, raw
        )));
    }

    Ok(())
}

/// Checks every configured selector compiles
fn validate_source_selectors(source: &SourceConfig) -> Result<(), ConfigError> {
    let selectors = &source.selectors;

    if selectors.item.trim().is_empty() || selectors.title.trim().is_empty() {
        return Err(ConfigError::Validation(format!(
            "Source '{}': item and title selectors are required",
            source.name
        )));
    }

    let listing = [
        Some(&selectors.item),
        Some(&selectors.title),
        selectors.link.as_ref(),
        selectors.summary.as_ref(),
        selectors.image.as_ref(),
        selectors.doc_number.as_ref(),
        selectors.issue_date.as_ref(),
        selectors.doc_type.as_ref(),
    ];

    for selector in listing.into_iter().flatten() {
        validate_selector(selector, &source.name)?;
    }

    if let Some(detail) = &source.detail_selectors {
        for selector in detail_selector_list(detail).into_iter().flatten() {
            validate_selector(selector, &source.name)?;
        }
    }

    Ok(())
}

fn detail_selector_list(detail: &DetailSelectors) -> [Option<&String>; 12] {
    [
        detail.title.as_ref(),
        detail.doc_number.as_ref(),
        detail.doc_type.as_ref(),
        detail.issuing_body.as_ref(),
        detail.signer.as_ref(),
        detail.issue_date.as_ref(),
        detail.effective_date.as_ref(),
        detail.status.as_ref(),
        detail.abstract_text.as_ref(),
        detail.content.as_ref(),
        detail.pdf_link.as_ref(),
        detail.tags.as_ref(),
    ]
}

fn validate_selector(selector: &str, source: &str) -> Result<(), ConfigError> {
    Selector::parse(selector).map_err(|_| ConfigError::InvalidSelector {
        source_name: source.to_string(),
        selector: selector.to_string(),
    })?;
    Ok(())
}
