//! Ingestion of accepted candidates into the durable store
//!
//! The gate checks the store for each candidate, optionally routes it through the
//! transformation collaborator, builds the persisted entity and counts the outcome.

mod gate;
pub mod transform;

pub use gate::{slugify, IngestReport, IngestionGate};
pub use transform::{
    ArticleRewrite, ChatTransformer, DisabledTransformer, LegalSummary, TransformError,
    Transformer,
};
