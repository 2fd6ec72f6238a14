use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::query::Query;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::{Row, Sqlite};
use tracing::{debug, warn};

use super::{Dialect, FarmerSink, FarmerTable, WriteKind};
use crate::domain::error::{AppError, Result};
use crate::domain::records::{CanonicalRecord, FarmerRow, LoadBatch};
use crate::domain::summary::{BatchOutcome, FailedRecord, TableStats};

/// SQLite-backed sink. Decimals are stored as text to keep their exact value.
pub struct SqliteFarmerSink {
    pool: SqlitePool,
    table: FarmerTable,
}

impl SqliteFarmerSink {
    pub async fn connect(database_url: &str, table_name: &str) -> Result<Self> {
        let in_memory = database_url.contains(":memory:");

        let mut options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| AppError::ConfigError(format!("Failed to parse SQLite connection string: {}", e)))?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));
        if !in_memory {
            options = options
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal);
        }

        // An in-memory database lives as long as its single connection
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(4)
        };

        let pool = pool_options
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(options)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to connect to SQLite: {}", e)))?;

        Ok(Self {
            pool,
            table: FarmerTable::new(table_name, Dialect::Sqlite),
        })
    }

    async fn write_record(
        &self,
        tx: &mut sqlx::Transaction<'_, Sqlite>,
        record: &CanonicalRecord,
        now: DateTime<Utc>,
    ) -> std::result::Result<WriteKind, sqlx::Error> {
        let existing: Option<i64> = sqlx::query_scalar(&self.table.select_id_sql())
            .bind(&record.farmer_code)
            .fetch_optional(&mut **tx)
            .await?;

        if existing.is_none() {
            bind_record(sqlx::query(&self.table.insert_sql()), record, now)
                .execute(&mut **tx)
                .await?;
            return Ok(WriteKind::Inserted);
        }

        let result = bind_record(sqlx::query(&self.table.update_sql()), record, now)
            .execute(&mut **tx)
            .await?;
        Ok(if result.rows_affected() > 0 {
            WriteKind::Updated
        } else {
            WriteKind::Unchanged
        })
    }
}

fn bind_record<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    record: &'q CanonicalRecord,
    now: DateTime<Utc>,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    query
        .bind(record.serial_number)
        .bind(&record.status)
        .bind(&record.farmer_code)
        .bind(&record.farmer_name)
        .bind(&record.govt_id_number)
        .bind(&record.primary_contact)
        .bind(record.farmer_created_date)
        .bind(record.plot_created_date)
        .bind(record.sync_date)
        .bind(record.updation_date)
        .bind(record.area.as_ref().map(|d| d.to_string()))
        .bind(record.gps_area.as_ref().map(|d| d.to_string()))
        .bind(&record.village)
        .bind(&record.source_sheet)
        .bind(record.imported_at)
        .bind(now)
}

#[async_trait]
impl FarmerSink for SqliteFarmerSink {
    fn table_name(&self) -> &str {
        self.table.name()
    }

    async fn health_check(&self) -> Result<String> {
        sqlx::query_scalar::<_, String>("SELECT sqlite_version()")
            .fetch_one(&self.pool)
            .await
            .map(|version| format!("SQLite {}", version))
            .map_err(|e| AppError::DatabaseError(format!("SQLite health check failed: {}", e)))
    }

    async fn ensure_schema(&self) -> Result<()> {
        for statement in self.table.schema_statements() {
            sqlx::query(&statement)
                .execute(&self.pool)
                .await
                .map_err(|e| AppError::DatabaseError(format!("Failed to apply schema: {}", e)))?;
        }
        debug!(table = %self.table.name(), "Schema ensured");
        Ok(())
    }

    async fn upsert_batch(&self, batch: LoadBatch<'_>) -> Result<BatchOutcome> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to begin transaction: {}", e)))?;

        let now = Utc::now();
        let mut outcome = BatchOutcome::default();

        for record in batch.records {
            match self.write_record(&mut tx, record, now).await {
                Ok(WriteKind::Inserted) => outcome.inserted += 1,
                Ok(WriteKind::Updated) => outcome.updated += 1,
                Ok(WriteKind::Unchanged) => outcome.unchanged += 1,
                Err(sqlx::Error::Database(db_err)) => {
                    warn!(
                        batch = batch.sequence,
                        farmer_code = %record.farmer_code,
                        error = %db_err,
                        "Record rejected by database; rolling back batch"
                    );
                    if let Err(e) = tx.rollback().await {
                        warn!(error = %e, "Rollback failed");
                    }
                    return Ok(BatchOutcome {
                        failed: vec![FailedRecord {
                            farmer_code: record.farmer_code.clone(),
                            error: db_err.to_string(),
                        }],
                        ..Default::default()
                    });
                }
                Err(e) => {
                    return Err(AppError::DatabaseError(format!(
                        "Batch {} aborted: {}",
                        batch.sequence, e
                    )))
                }
            }
        }

        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to commit batch {}: {}", batch.sequence, e)))?;
        Ok(outcome)
    }

    async fn table_stats(&self) -> Result<TableStats> {
        let total_records: i64 = sqlx::query_scalar(&self.table.count_sql())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to count records: {}", e)))?;

        let records_by_sheet: Vec<(String, i64)> = sqlx::query_as(&self.table.count_by_sheet_sql())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to count records by sheet: {}", e)))?;

        let records_by_status: Vec<(Option<String>, i64)> = sqlx::query_as(&self.table.count_by_status_sql())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to count records by status: {}", e)))?;

        Ok(TableStats {
            total_records,
            records_by_sheet,
            records_by_status,
        })
    }

    async fn fetch_farmer(&self, farmer_code: &str) -> Result<Option<FarmerRow>> {
        let row = sqlx::query(&self.table.select_row_sql())
            .bind(farmer_code)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to fetch farmer: {}", e)))?;

        match row {
            Some(row) => farmer_from_row(&row).map(Some),
            None => Ok(None),
        }
    }
}

fn farmer_from_row(row: &SqliteRow) -> Result<FarmerRow> {
    let decode = |e: sqlx::Error| AppError::DatabaseError(format!("Failed to decode farmer row: {}", e));
    let decimal = |column: &str| -> Result<Option<BigDecimal>> {
        let raw: Option<String> = row.try_get(column).map_err(decode)?;
        raw.map(|value| {
            BigDecimal::from_str(&value)
                .map_err(|e| AppError::DatabaseError(format!("Stored {} '{}' is not a decimal: {}", column, value, e)))
        })
        .transpose()
    };

    Ok(FarmerRow {
        id: row.try_get("id").map_err(decode)?,
        record: CanonicalRecord {
            serial_number: row.try_get("serial_number").map_err(decode)?,
            status: row.try_get("status").map_err(decode)?,
            farmer_code: row.try_get("farmer_code").map_err(decode)?,
            farmer_name: row.try_get("farmer_name").map_err(decode)?,
            govt_id_number: row.try_get("govt_id_number").map_err(decode)?,
            primary_contact: row.try_get("primary_contact").map_err(decode)?,
            farmer_created_date: row.try_get::<Option<NaiveDate>, _>("farmer_created_date").map_err(decode)?,
            plot_created_date: row.try_get::<Option<NaiveDate>, _>("plot_created_date").map_err(decode)?,
            sync_date: row.try_get::<Option<NaiveDate>, _>("sync_date").map_err(decode)?,
            updation_date: row.try_get::<Option<NaiveDate>, _>("updation_date").map_err(decode)?,
            area: decimal("area")?,
            gps_area: decimal("gps_area")?,
            village: row.try_get("village").map_err(decode)?,
            source_sheet: row.try_get("source_sheet").map_err(decode)?,
            imported_at: row.try_get("imported_at").map_err(decode)?,
        },
        created_at: row.try_get("created_at").map_err(decode)?,
        updated_at: row.try_get("updated_at").map_err(decode)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(code: &str, govt_id: Option<&str>, village: &str) -> CanonicalRecord {
        CanonicalRecord {
            serial_number: Some(1),
            status: Some("New".to_string()),
            farmer_code: code.to_string(),
            farmer_name: "Asha".to_string(),
            govt_id_number: govt_id.map(str::to_string),
            primary_contact: None,
            farmer_created_date: NaiveDate::from_ymd_opt(2024, 1, 5),
            plot_created_date: None,
            sync_date: None,
            updation_date: None,
            area: Some(BigDecimal::from_str("1.50").unwrap()),
            gps_area: None,
            village: village.to_string(),
            source_sheet: "A".to_string(),
            imported_at: Utc::now(),
        }
    }

    async fn sink() -> SqliteFarmerSink {
        let sink = SqliteFarmerSink::connect("sqlite::memory:", "farmers").await.unwrap();
        sink.ensure_schema().await.unwrap();
        sink
    }

    #[tokio::test]
    async fn test_ensure_schema_is_idempotent() {
        let sink = sink().await;
        sink.ensure_schema().await.unwrap();
        assert!(sink.health_check().await.unwrap().starts_with("SQLite"));
        assert_eq!(sink.table_stats().await.unwrap().total_records, 0);
    }

    #[tokio::test]
    async fn test_insert_then_unchanged_then_update() {
        let sink = sink().await;
        let records = vec![record("F001", Some("ID-1"), "Kampli")];

        let first = sink
            .upsert_batch(LoadBatch { sequence: 1, records: &records })
            .await
            .unwrap();
        assert_eq!(first.inserted, 1);
        let stored = sink.fetch_farmer("F001").await.unwrap().unwrap();
        assert_eq!(stored.record.area, records[0].area);
        assert_eq!(stored.created_at, stored.updated_at);

        // Same content with a later import timestamp leaves the row alone
        let mut again = records.clone();
        again[0].imported_at = Utc::now() + chrono::Duration::seconds(5);
        let second = sink
            .upsert_batch(LoadBatch { sequence: 1, records: &again })
            .await
            .unwrap();
        assert_eq!(second.unchanged, 1);
        assert_eq!(second.inserted + second.updated, 0);
        let untouched = sink.fetch_farmer("F001").await.unwrap().unwrap();
        assert_eq!(untouched, stored);

        let moved = vec![record("F001", Some("ID-1"), "Siruguppa")];
        let third = sink
            .upsert_batch(LoadBatch { sequence: 1, records: &moved })
            .await
            .unwrap();
        assert_eq!(third.updated, 1);
        let updated = sink.fetch_farmer("F001").await.unwrap().unwrap();
        assert_eq!(updated.record.village, "Siruguppa");
        assert_eq!(updated.id, stored.id);
        assert_eq!(updated.created_at, stored.created_at);
    }

    #[tokio::test]
    async fn test_constraint_violation_rolls_back_whole_batch() {
        let sink = sink().await;
        let records = vec![
            record("F001", Some("ID-1"), "Kampli"),
            record("F002", Some("ID-1"), "Kampli"),
        ];

        let outcome = sink
            .upsert_batch(LoadBatch { sequence: 3, records: &records })
            .await
            .unwrap();
        assert!(!outcome.is_committed());
        assert_eq!(outcome.failed[0].farmer_code, "F002");
        assert_eq!(outcome.inserted, 0);
        assert!(sink.fetch_farmer("F001").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_table_stats_group_by_sheet_and_status() {
        let sink = sink().await;
        let mut second = record("F002", None, "Kampli");
        second.source_sheet = "B".to_string();
        second.status = None;
        let records = vec![record("F001", None, "Kampli"), second];

        sink.upsert_batch(LoadBatch { sequence: 1, records: &records })
            .await
            .unwrap();

        let stats = sink.table_stats().await.unwrap();
        assert_eq!(stats.total_records, 2);
        assert_eq!(stats.records_by_sheet, vec![("A".to_string(), 1), ("B".to_string(), 1)]);
        assert!(stats.records_by_status.contains(&(None, 1)));
        assert!(stats.records_by_status.contains(&(Some("New".to_string()), 1)));
    }
}
