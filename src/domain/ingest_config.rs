// ============================================================
// INGEST CONFIGURATION
// ============================================================
// Tunable values for reconciliation, cleaning and loading

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use validator::Validate;

use super::alias_table::default_aliases;
use super::canonical::CanonicalField;
use super::error::{AppError, Result};

static TABLE_NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("valid table name regex"));

/// What to do when a record repeats a key already accepted in this run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicatePolicy {
    /// First occurrence wins; later duplicates are rejected
    DropNew,
    /// Later occurrence wins; the earlier record is superseded
    KeepLast,
}

impl Default for DuplicatePolicy {
    fn default() -> Self {
        Self::DropNew
    }
}

impl fmt::Display for DuplicatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DropNew => write!(f, "drop-new"),
            Self::KeepLast => write!(f, "keep-last"),
        }
    }
}

impl std::str::FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "drop-new" | "drop_new" => Ok(Self::DropNew),
            "keep-last" | "keep_last" => Ok(Self::KeepLast),
            _ => Err(format!("Unknown duplicate policy: {}", s)),
        }
    }
}

/// What to do with a record whose only problems are unparsable optional values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnparsablePolicy {
    /// Load the record with the offending fields set to null
    LoadWithNulls,
    /// Leave the record out of the load
    Drop,
}

impl Default for UnparsablePolicy {
    fn default() -> Self {
        Self::LoadWithNulls
    }
}

/// Expected share of status-only rows per sheet.
/// Departing from `expected` by more than `tolerance` raises a warning.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct DiscardRateConfig {
    #[validate(range(min = 0.0, max = 1.0))]
    pub expected: f64,

    #[validate(range(min = 0.0, max = 1.0))]
    pub tolerance: f64,

    /// Sheets with fewer rows than this are too small to judge
    pub min_rows: usize,
}

impl Default for DiscardRateConfig {
    fn default() -> Self {
        Self {
            expected: 0.5,
            tolerance: 0.25,
            min_rows: 20,
        }
    }
}

/// Connection settings for the target database
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Full connection URL; wins over the individual parts below
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: Option<String>,

    /// Target table for farmer rows
    pub table_name: String,

    #[validate(range(min = 1, max = 64))]
    pub max_connections: u32,

    /// Seconds to wait for a pooled connection
    #[validate(range(min = 1, max = 600))]
    pub connect_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: "localhost".to_string(),
            port: 5432,
            database: "farmers".to_string(),
            username: "postgres".to_string(),
            password: None,
            table_name: "bellary_farmers".to_string(),
            max_connections: 5,
            connect_timeout_secs: 10,
        }
    }
}

/// Top-level ingest configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct IngestConfig {
    /// Canonical field name -> accepted raw headers
    pub aliases: BTreeMap<String, Vec<String>>,

    /// Date formats tried in order; first match wins
    #[validate(length(min = 1))]
    pub date_formats: Vec<String>,

    /// Records per load transaction
    #[validate(range(min = 1, max = 100000))]
    pub batch_size: usize,

    pub duplicate_policy: DuplicatePolicy,

    pub unparsable_policy: UnparsablePolicy,

    pub discard_rate: DiscardRateConfig,

    /// Cell values treated as empty (compared case-insensitively)
    pub null_placeholders: Vec<String>,

    /// Sheets to process, in order. Empty means every sheet in workbook order.
    pub sheet_order: Vec<String>,

    pub database: DatabaseConfig,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            aliases: default_aliases()
                .into_iter()
                .map(|(field, aliases)| (field.as_str().to_string(), aliases))
                .collect(),
            date_formats: vec![
                "%Y-%m-%d".to_string(),
                "%d/%m/%Y".to_string(),
                "%d-%m-%Y".to_string(),
                "%d.%m.%Y".to_string(),
                "%d-%b-%Y".to_string(),
                "%Y-%m-%d %H:%M:%S".to_string(),
                "%d/%m/%Y %H:%M:%S".to_string(),
                "%d/%m/%Y %H:%M".to_string(),
            ],
            batch_size: 500,
            duplicate_policy: DuplicatePolicy::default(),
            unparsable_policy: UnparsablePolicy::default(),
            discard_rate: DiscardRateConfig::default(),
            null_placeholders: ["nan", "null", "none", "na", "n/a", "-", "--", "nil"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            sheet_order: Vec::new(),
            database: DatabaseConfig::default(),
        }
    }
}

impl IngestConfig {
    /// Check every value; called once before any sheet is read
    pub fn check(&self) -> Result<()> {
        self.validate()
            .map_err(|e| AppError::ConfigError(format!("Invalid ingest config: {}", e)))?;
        self.discard_rate
            .validate()
            .map_err(|e| AppError::ConfigError(format!("Invalid discard_rate config: {}", e)))?;
        self.database
            .validate()
            .map_err(|e| AppError::ConfigError(format!("Invalid database config: {}", e)))?;

        if self.date_formats.iter().any(|f| f.trim().is_empty()) {
            return Err(AppError::ConfigError("date_formats contains a blank format".to_string()));
        }

        if !TABLE_NAME_PATTERN.is_match(&self.database.table_name) {
            return Err(AppError::ConfigError(format!(
                "table_name '{}' is not a plain SQL identifier",
                self.database.table_name
            )));
        }

        self.alias_map().map(|_| ())
    }

    /// Alias configuration keyed by typed field; unknown field names are rejected
    pub fn alias_map(&self) -> Result<BTreeMap<CanonicalField, Vec<String>>> {
        self.aliases
            .iter()
            .map(|(name, aliases)| {
                let field = name
                    .parse::<CanonicalField>()
                    .map_err(AppError::ConfigError)?;
                Ok((field, aliases.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = IngestConfig::default();
        assert!(config.check().is_ok());
        assert_eq!(config.batch_size, 500);
        assert_eq!(config.duplicate_policy, DuplicatePolicy::DropNew);
        assert_eq!(config.alias_map().unwrap().len(), 13);
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        let config = IngestConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(config.check().is_err());
    }

    #[test]
    fn test_out_of_range_tolerance_is_rejected() {
        let mut config = IngestConfig::default();
        config.discard_rate.tolerance = 1.5;
        assert!(config.check().is_err());
    }

    #[test]
    fn test_unknown_alias_field_is_rejected() {
        let mut config = IngestConfig::default();
        config
            .aliases
            .insert("plot_owner".to_string(), vec!["Owner".to_string()]);
        let err = config.check().unwrap_err();
        assert!(err.to_string().contains("plot_owner"));
    }

    #[test]
    fn test_zero_connect_timeout_is_rejected() {
        let mut config = IngestConfig::default();
        config.database.connect_timeout_secs = 0;
        let err = config.check().unwrap_err();
        assert!(err.to_string().contains("connect_timeout_secs"));
    }

    #[test]
    fn test_table_name_must_be_identifier() {
        let mut config = IngestConfig::default();
        config.database.table_name = "farmers; DROP TABLE x".to_string();
        assert!(config.check().is_err());
    }

    #[test]
    fn test_duplicate_policy_from_str() {
        assert_eq!("keep-last".parse::<DuplicatePolicy>().unwrap(), DuplicatePolicy::KeepLast);
        assert_eq!("DROP-NEW".parse::<DuplicatePolicy>().unwrap(), DuplicatePolicy::DropNew);
        assert!("newest".parse::<DuplicatePolicy>().is_err());
    }
}
