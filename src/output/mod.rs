//! Output module for run summaries and statistics
//!
//! This module handles:
//! - Printing the outcome of finished crawl runs
//! - Loading and printing run history and stored record counts

pub mod stats;

pub use stats::{
    format_run_line, load_statistics, print_run_result, print_statistics, IngestStatistics,
    RECENT_RUNS,
};
