pub mod alias_table;
pub mod canonical;
pub mod error;
pub mod ingest_config;
pub mod records;
pub mod summary;
pub mod validation;
