use serde::{Deserialize, Serialize};
use std::fmt;

use super::canonical::CanonicalField;
use super::summary::LoadAbort;

/// Sheet-level failures raised while reconciling headers.
/// The affected sheet is rejected; other sheets keep going.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchemaError {
    AmbiguousMapping {
        sheet: String,
        field: CanonicalField,
        first_header: String,
        second_header: String,
    },
    MissingRequiredColumn {
        sheet: String,
        fields: Vec<CanonicalField>,
    },
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaError::AmbiguousMapping {
                sheet,
                field,
                first_header,
                second_header,
            } => write!(
                f,
                "sheet '{}': headers '{}' and '{}' both map to '{}'",
                sheet, first_header, second_header, field
            ),
            SchemaError::MissingRequiredColumn { sheet, fields } => {
                let names = fields
                    .iter()
                    .map(|field| field.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "sheet '{}': missing required column(s): {}", sheet, names)
            }
        }
    }
}

impl std::error::Error for SchemaError {}

#[derive(Debug, Serialize, Deserialize)]
pub enum AppError {
    Internal(String),
    ConfigError(String),
    Schema(SchemaError),
    SourceError(String),
    ParseError(String),
    DatabaseError(String),
    LoadAborted(LoadAbort),
    IoError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Schema(err) => write!(f, "Schema error: {}", err),
            AppError::SourceError(msg) => write!(f, "Source error: {}", msg),
            AppError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            AppError::DatabaseError(msg) => write!(f, "Database error: {}", msg),
            AppError::LoadAborted(abort) => {
                write!(f, "Load aborted at batch {}: {}", abort.batch, abort.error)
            }
            AppError::IoError(msg) => write!(f, "IO error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::IoError(err.to_string())
    }
}

impl From<SchemaError> for AppError {
    fn from(err: SchemaError) -> Self {
        AppError::Schema(err)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
