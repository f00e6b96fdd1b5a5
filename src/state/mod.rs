//! State module for crawl run bookkeeping
//!
//! # Components
//!
//! - `RunStatus`: lifecycle of a crawl run (started, completed, failed)
//! - `CrawlType`: what a run ingests (legal documents or news articles)
//! - `CrawlRun`: the audit record written once per orchestration invocation

mod crawl_run;
mod run_state;

// Re-export main types
pub use crawl_run::CrawlRun;
pub use run_state::{CrawlType, RunStatus};
