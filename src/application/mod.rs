pub mod use_cases;

pub use use_cases::ingest_pipeline::{IngestPipeline, PreparedRun};
pub use use_cases::loader::Loader;
