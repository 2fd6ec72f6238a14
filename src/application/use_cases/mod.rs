pub mod ingest_pipeline;
pub mod loader;
pub mod merger;
pub mod record_validator;
pub mod row_classifier;
pub mod schema_reconciler;
