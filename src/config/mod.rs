//! Configuration module for Insurwatch
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use insurwatch::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("insurwatch.toml")).unwrap();
//! println!("Sources configured: {}", config.sources.len());
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, CrawlerConfig, DetailFetch, DetailSelectors, FilterConfig, IngestConfig,
    OutputConfig, PriorityPolicy, RendererKind, SelectorMap, SourceConfig, SourceKind,
    TransportConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
pub use validation::validate;
