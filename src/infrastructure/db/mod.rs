pub mod postgres;
pub mod sqlite;

use async_trait::async_trait;
use tracing::info;

use crate::domain::canonical::CanonicalField;
use crate::domain::error::{AppError, Result};
use crate::domain::ingest_config::DatabaseConfig;
use crate::domain::records::{FarmerRow, LoadBatch};
use crate::domain::summary::{BatchOutcome, TableStats};
use postgres::PostgresFarmerSink;
use sqlite::SqliteFarmerSink;

/// Target table for canonical farmer records
#[async_trait]
pub trait FarmerSink: Send + Sync {
    fn table_name(&self) -> &str;

    /// Server version string; fails when the connection is unusable
    async fn health_check(&self) -> Result<String>;

    /// Create the table and its indexes if absent
    async fn ensure_schema(&self) -> Result<()>;

    /// Write one batch in a single transaction.
    /// Record-level database errors roll the batch back and come back in
    /// `BatchOutcome::failed`; anything else is returned as an error.
    async fn upsert_batch(&self, batch: LoadBatch<'_>) -> Result<BatchOutcome>;

    async fn table_stats(&self) -> Result<TableStats>;

    async fn fetch_farmer(&self, farmer_code: &str) -> Result<Option<FarmerRow>>;
}

/// Open the sink matching the URL scheme and log the server version
pub async fn connect_sink(url: &str, config: &DatabaseConfig) -> Result<Box<dyn FarmerSink>> {
    let sink: Box<dyn FarmerSink> = if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        Box::new(PostgresFarmerSink::connect(url, config).await?)
    } else if url.starts_with("sqlite:") {
        Box::new(SqliteFarmerSink::connect(url, &config.table_name).await?)
    } else {
        return Err(AppError::ConfigError(format!(
            "Unsupported database URL scheme: {}",
            redact_url(url)
        )));
    };

    let version = sink.health_check().await?;
    info!(url = %redact_url(url), version = %version, "Connected to database");
    Ok(sink)
}

/// Hide the password part of a connection URL for logging
pub fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            let credentials = &url[scheme_end + 3..at];
            match credentials.find(':') {
                Some(colon) => format!(
                    "{}{}:***{}",
                    &url[..scheme_end + 3],
                    &credentials[..colon],
                    &url[at..]
                ),
                None => url.to_string(),
            }
        }
        _ => url.to_string(),
    }
}

/// How one record landed in the table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteKind {
    Inserted,
    Updated,
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Sqlite,
}

impl Dialect {
    fn placeholder(&self, n: usize) -> String {
        match self {
            Dialect::Postgres => format!("${}", n),
            Dialect::Sqlite => format!("?{}", n),
        }
    }

    /// Null-safe inequality operator
    fn distinct(&self) -> &'static str {
        match self {
            Dialect::Postgres => "IS DISTINCT FROM",
            Dialect::Sqlite => "IS NOT",
        }
    }
}

/// SQL text for the farmer table.
///
/// Write statements share one parameter layout: `1..=13` are the canonical
/// fields in column order, `14` is `source_sheet`, `15` is `imported_at`
/// and `16` is the write timestamp.
#[derive(Debug, Clone)]
pub struct FarmerTable {
    name: String,
    dialect: Dialect,
}

pub const PARAM_SOURCE_SHEET: usize = 14;
pub const PARAM_IMPORTED_AT: usize = 15;
pub const PARAM_NOW: usize = 16;

impl FarmerTable {
    pub fn new(name: impl Into<String>, dialect: Dialect) -> Self {
        Self {
            name: name.into(),
            dialect,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema_statements(&self) -> Vec<String> {
        let t = &self.name;
        let (id, date, decimal, timestamp) = match self.dialect {
            Dialect::Postgres => ("BIGSERIAL PRIMARY KEY", "DATE", "NUMERIC", "TIMESTAMPTZ"),
            Dialect::Sqlite => ("INTEGER PRIMARY KEY AUTOINCREMENT", "DATE", "TEXT", "TIMESTAMP"),
        };

        vec![
            format!(
                "CREATE TABLE IF NOT EXISTS {t} (
                    id {id},
                    serial_number BIGINT,
                    status TEXT,
                    farmer_code TEXT NOT NULL,
                    farmer_name TEXT NOT NULL,
                    govt_id_number TEXT,
                    primary_contact TEXT,
                    farmer_created_date {date},
                    plot_created_date {date},
                    sync_date {date},
                    updation_date {date},
                    area {decimal},
                    gps_area {decimal},
                    village TEXT NOT NULL,
                    source_sheet TEXT NOT NULL,
                    imported_at {timestamp} NOT NULL,
                    created_at {timestamp} NOT NULL,
                    updated_at {timestamp} NOT NULL
                )"
            ),
            format!("CREATE UNIQUE INDEX IF NOT EXISTS idx_{t}_farmer_code ON {t} (farmer_code)"),
            format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_{t}_govt_id_number ON {t} (govt_id_number) \
                 WHERE govt_id_number IS NOT NULL"
            ),
            format!("CREATE INDEX IF NOT EXISTS idx_{t}_village ON {t} (village)"),
            format!("CREATE INDEX IF NOT EXISTS idx_{t}_farmer_created_date ON {t} (farmer_created_date)"),
            format!("CREATE INDEX IF NOT EXISTS idx_{t}_source_sheet ON {t} (source_sheet)"),
        ]
    }

    pub fn select_id_sql(&self) -> String {
        format!(
            "SELECT id FROM {} WHERE farmer_code = {}",
            self.name,
            self.dialect.placeholder(1)
        )
    }

    pub fn select_row_sql(&self) -> String {
        format!(
            "SELECT id, {}, source_sheet, imported_at, created_at, updated_at FROM {} WHERE farmer_code = {}",
            field_list(),
            self.name,
            self.dialect.placeholder(1)
        )
    }

    pub fn insert_sql(&self) -> String {
        let p = |n: usize| self.dialect.placeholder(n);
        let values: Vec<String> = (1..=PARAM_IMPORTED_AT).map(p).collect();
        format!(
            "INSERT INTO {} ({}, source_sheet, imported_at, created_at, updated_at) VALUES ({}, {}, {})",
            self.name,
            field_list(),
            values.join(", "),
            p(PARAM_NOW),
            p(PARAM_NOW)
        )
    }

    /// Overwrite an existing row only when some compared column differs
    pub fn update_sql(&self) -> String {
        let p = |n: usize| self.dialect.placeholder(n);
        let distinct = self.dialect.distinct();

        let mut assignments: Vec<String> = CanonicalField::ALL
            .iter()
            .map(|field| format!("{} = {}", field, p(field.index() + 1)))
            .collect();
        assignments.push(format!("source_sheet = {}", p(PARAM_SOURCE_SHEET)));
        assignments.push(format!("imported_at = {}", p(PARAM_IMPORTED_AT)));
        assignments.push(format!("updated_at = {}", p(PARAM_NOW)));

        let mut differences: Vec<String> = CanonicalField::ALL
            .iter()
            .filter(|field| **field != CanonicalField::FarmerCode)
            .map(|field| format!("{} {} {}", field, distinct, p(field.index() + 1)))
            .collect();
        differences.push(format!("source_sheet {} {}", distinct, p(PARAM_SOURCE_SHEET)));

        format!(
            "UPDATE {} SET {} WHERE farmer_code = {} AND ({})",
            self.name,
            assignments.join(", "),
            p(CanonicalField::FarmerCode.index() + 1),
            differences.join(" OR ")
        )
    }

    pub fn count_sql(&self) -> String {
        format!("SELECT COUNT(*) FROM {}", self.name)
    }

    pub fn count_by_sheet_sql(&self) -> String {
        format!(
            "SELECT source_sheet, COUNT(*) FROM {} GROUP BY source_sheet ORDER BY source_sheet",
            self.name
        )
    }

    pub fn count_by_status_sql(&self) -> String {
        format!(
            "SELECT status, COUNT(*) FROM {} GROUP BY status ORDER BY status",
            self.name
        )
    }
}

fn field_list() -> String {
    CanonicalField::ALL
        .iter()
        .map(|field| field.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_compares_every_column_but_the_key() {
        let sql = FarmerTable::new("bellary_farmers", Dialect::Postgres).update_sql();
        assert!(sql.starts_with("UPDATE bellary_farmers SET serial_number = $1,"));
        assert!(sql.contains("WHERE farmer_code = $3 AND ("));
        assert!(sql.contains("village IS DISTINCT FROM $13"));
        assert!(sql.contains("source_sheet IS DISTINCT FROM $14"));
        assert!(!sql.contains("farmer_code IS DISTINCT FROM"));
        assert!(!sql.contains("imported_at IS DISTINCT FROM"));
    }

    #[test]
    fn test_sqlite_placeholders_are_numbered() {
        let table = FarmerTable::new("farmers", Dialect::Sqlite);
        let insert = table.insert_sql();
        assert!(insert.contains("VALUES (?1, ?2,"));
        assert!(insert.ends_with("?15, ?16, ?16)"));
        assert!(table.update_sql().contains("gps_area IS NOT ?12"));
    }

    #[test]
    fn test_schema_has_table_and_five_indexes() {
        let statements = FarmerTable::new("farmers", Dialect::Postgres).schema_statements();
        assert_eq!(statements.len(), 6);
        assert!(statements.iter().all(|s| s.contains("IF NOT EXISTS")));
        assert!(statements[2].contains("WHERE govt_id_number IS NOT NULL"));
    }

    #[test]
    fn test_redact_url_hides_password() {
        assert_eq!(
            redact_url("postgres://farm:secret@db:5432/farmers"),
            "postgres://farm:***@db:5432/farmers"
        );
        assert_eq!(redact_url("sqlite::memory:"), "sqlite::memory:");
    }
}
