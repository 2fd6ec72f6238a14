use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgArguments, PgConnectOptions, PgPool, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Postgres, Row};
use tracing::{debug, error, warn};

use super::{Dialect, FarmerSink, FarmerTable, WriteKind};
use crate::domain::error::{AppError, Result};
use crate::domain::ingest_config::DatabaseConfig;
use crate::domain::records::{CanonicalRecord, FarmerRow, LoadBatch};
use crate::domain::summary::{BatchOutcome, FailedRecord, TableStats};

pub struct PostgresFarmerSink {
    pool: PgPool,
    table: FarmerTable,
}

impl PostgresFarmerSink {
    pub async fn connect(url: &str, config: &DatabaseConfig) -> Result<Self> {
        let options = PgConnectOptions::from_str(url).map_err(|e| {
            AppError::ConfigError(format!("Failed to parse PostgreSQL connection string: {}", e))
        })?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect_with(options)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to connect to PostgreSQL");
                AppError::DatabaseError(format!("Failed to connect to PostgreSQL: {}", e))
            })?;

        Ok(Self {
            pool,
            table: FarmerTable::new(config.table_name.clone(), Dialect::Postgres),
        })
    }

    async fn write_record(
        &self,
        tx: &mut sqlx::Transaction<'_, Postgres>,
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
    query: Query<'q, Postgres, PgArguments>,
    record: &'q CanonicalRecord,
    now: DateTime<Utc>,
) -> Query<'q, Postgres, PgArguments> {
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
        .bind(&record.area)
        .bind(&record.gps_area)
        .bind(&record.village)
        .bind(&record.source_sheet)
        .bind(record.imported_at)
        .bind(now)
}

#[async_trait]
impl FarmerSink for PostgresFarmerSink {
    fn table_name(&self) -> &str {
        self.table.name()
    }

    async fn health_check(&self) -> Result<String> {
        sqlx::query_scalar::<_, String>("SELECT version()")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("PostgreSQL health check failed: {}", e)))
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

        row.map(|r| farmer_from_row(&r))
            .transpose()
            .map_err(|e| AppError::DatabaseError(format!("Failed to decode farmer row: {}", e)))
    }
}

fn farmer_from_row(row: &PgRow) -> std::result::Result<FarmerRow, sqlx::Error> {
    Ok(FarmerRow {
        id: row.try_get("id")?,
        record: CanonicalRecord {
            serial_number: row.try_get("serial_number")?,
            status: row.try_get("status")?,
            farmer_code: row.try_get("farmer_code")?,
            farmer_name: row.try_get("farmer_name")?,
            govt_id_number: row.try_get("govt_id_number")?,
            primary_contact: row.try_get("primary_contact")?,
            farmer_created_date: row.try_get::<Option<NaiveDate>, _>("farmer_created_date")?,
            plot_created_date: row.try_get::<Option<NaiveDate>, _>("plot_created_date")?,
            sync_date: row.try_get::<Option<NaiveDate>, _>("sync_date")?,
            updation_date: row.try_get::<Option<NaiveDate>, _>("updation_date")?,
            area: row.try_get::<Option<BigDecimal>, _>("area")?,
            gps_area: row.try_get::<Option<BigDecimal>, _>("gps_area")?,
            village: row.try_get("village")?,
            source_sheet: row.try_get("source_sheet")?,
            imported_at: row.try_get("imported_at")?,
        },
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
