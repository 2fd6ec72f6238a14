// ============================================================
// INGEST PIPELINE
// ============================================================
// Reconcile -> classify -> validate -> merge for every sheet,
// then load the merged records and summarize the run

use chrono::Utc;
use tracing::{error, info, warn};

use crate::application::use_cases::loader::Loader;
use crate::application::use_cases::merger::Merger;
use crate::application::use_cases::record_validator::{RecordValidator, Verdict};
use crate::application::use_cases::row_classifier::{Classification, RowClassifier};
use crate::application::use_cases::schema_reconciler::SchemaReconciler;
use crate::domain::alias_table::AliasTable;
use crate::domain::error::{AppError, Result};
use crate::domain::ingest_config::IngestConfig;
use crate::domain::records::{CanonicalRecord, RawSheet};
use crate::domain::summary::{RecordIssue, RunSummary, SheetReport};
use crate::infrastructure::db::FarmerSink;
use crate::infrastructure::source::SheetSource;

/// Records ready to load plus the summary built so far
#[derive(Debug, Clone)]
pub struct PreparedRun {
    pub summary: RunSummary,
    pub records: Vec<CanonicalRecord>,
}

pub struct IngestPipeline {
    config: IngestConfig,
    reconciler: SchemaReconciler,
}

impl IngestPipeline {
    /// Fails on configuration errors before any sheet is read
    pub fn new(config: IngestConfig) -> Result<Self> {
        config.check()?;
        let aliases = AliasTable::new(&config.alias_map()?)?;
        info!(
            aliases = aliases.alias_count(),
            duplicate_policy = %config.duplicate_policy,
            batch_size = config.batch_size,
            "Pipeline configured"
        );
        Ok(Self {
            config,
            reconciler: SchemaReconciler::new(aliases),
        })
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Read, reconcile, classify, validate and merge every sheet.
    /// Sheet-level failures are recorded in the summary; only source
    /// listing failures are returned as errors.
    pub fn prepare(&self, source: &mut dyn SheetSource) -> Result<PreparedRun> {
        let mut summary = RunSummary::new(Utc::now());
        let mut validator = RecordValidator::from_config(&self.config);
        let mut merger = Merger::new(summary.imported_at);

        let available = source.list_sheets()?;
        let order = if self.config.sheet_order.is_empty() {
            available.clone()
        } else {
            self.config.sheet_order.clone()
        };

        for name in order {
            if !available.contains(&name) {
                error!(sheet = %name, "Configured sheet not found in source");
                summary
                    .sheets
                    .push(SheetReport::rejected_sheet(&name, "sheet not found in source"));
                continue;
            }

            let report = match source.read_sheet(&name) {
                Ok(sheet) => self.process_sheet(&sheet, &mut validator, &mut merger, &mut summary),
                Err(e) => {
                    error!(sheet = %name, error = %e, "Failed to read sheet");
                    SheetReport::rejected_sheet(&name, e.to_string())
                }
            };
            summary.sheets.push(report);
        }

        let records = merger.finish();
        summary.merged_records = records.len();
        Ok(PreparedRun { summary, records })
    }

    fn process_sheet(
        &self,
        sheet: &RawSheet,
        validator: &mut RecordValidator,
        merger: &mut Merger,
        summary: &mut RunSummary,
    ) -> SheetReport {
        let column_map = match self.reconciler.reconcile(&sheet.name, &sheet.headers) {
            Ok(map) => map,
            Err(e) => {
                error!(sheet = %sheet.name, error = %e, "Sheet rejected");
                return SheetReport::rejected_sheet(&sheet.name, e.to_string());
            }
        };

        let mut report = SheetReport::new(&sheet.name);
        report.rows_read = sheet.rows.len();
        report.unmapped_headers = column_map.unmapped().to_vec();
        report.missing_fields = column_map.missing_fields().to_vec();

        let mut classifier = RowClassifier::new(&column_map, &self.config.null_placeholders);

        for row in &sheet.rows {
            let mapped = match classifier.classify(row) {
                Classification::Keep(mapped) => mapped,
                Classification::Discard(_) => continue,
            };

            let mut validated = validator.validate(&mapped);

            for superseded in std::mem::take(&mut validated.superseded) {
                merger.retract(&superseded.row);
                summary.superseded.push(RecordIssue {
                    row: superseded.row,
                    farmer_code: Some(superseded.farmer_code),
                    included: false,
                    violations: vec![superseded.violation],
                });
            }

            let included = validated.is_accepted();
            if !validated.outcome.is_valid() {
                report.issues.push(RecordIssue {
                    row: validated.row_ref.clone(),
                    farmer_code: validated.farmer_code.clone(),
                    included,
                    violations: validated.outcome.violations.clone(),
                });
            }

            match validated.verdict {
                Verdict::Accept(draft) => {
                    merger.accept(validated.row_ref, draft);
                    report.accepted += 1;
                }
                Verdict::Reject => report.rejected += 1,
            }
        }

        let stats = classifier.stats();
        report.kept = stats.kept;
        report.discarded = stats.discarded();
        report.blank_rows = stats.blank;
        report.status_only_rows = stats.status_only;

        if let Some(warning) = stats.drift_warning(&self.config.discard_rate) {
            warn!(sheet = %sheet.name, "{}", warning);
            report.warnings.push(warning);
        }

        info!(
            sheet = %sheet.name,
            mapped_fields = column_map.coverage(),
            rows = report.rows_read,
            kept = report.kept,
            discarded = report.discarded,
            accepted = report.accepted,
            rejected = report.rejected,
            "Sheet processed"
        );
        report
    }

    /// Load prepared records, then record table statistics and verify the count.
    /// When the load aborts, the partial report is still stored in the summary
    /// before the error is returned.
    pub async fn load(&self, run: &mut PreparedRun, sink: &dyn FarmerSink, create_table: bool) -> Result<()> {
        if create_table {
            sink.ensure_schema().await?;
            info!(table = %sink.table_name(), "Table and indexes ensured");
        }

        let loader = Loader::new(sink, self.config.batch_size)?;
        let report = loader.load(&run.records).await;
        let aborted = report.aborted.clone();
        run.summary.load = Some(report);
        if let Some(abort) = aborted {
            return Err(AppError::LoadAborted(abort));
        }

        let stats = sink.table_stats().await?;
        if stats.total_records < run.summary.merged_records as i64 {
            warn!(
                table_total = stats.total_records,
                merged = run.summary.merged_records,
                "Table holds fewer records than were merged this run"
            );
        }
        run.summary.table_stats = Some(stats);
        Ok(())
    }

    /// Prepare and, unless the run is a total failure, load.
    /// The summary is logged even when loading fails.
    pub async fn run(&self, source: &mut dyn SheetSource, sink: Option<&dyn FarmerSink>, create_table: bool) -> Result<RunSummary> {
        let mut prepared = self.prepare(source)?;
        let mut loaded = Ok(());
        if let Some(sink) = sink {
            if prepared.summary.is_total_failure() {
                error!("No sheet could be processed; nothing loaded");
            } else {
                loaded = self.load(&mut prepared, sink, create_table).await;
            }
        }
        log_summary(&prepared.summary);
        loaded.map(|_| prepared.summary)
    }
}

/// End-of-run report in the log
pub fn log_summary(summary: &RunSummary) {
    info!(
        run_id = %summary.run_id,
        sheets_processed = summary.sheets_processed(),
        sheets_rejected = summary.sheets_rejected(),
        rows_discarded = summary.rows_discarded(),
        records_accepted = summary.records_accepted(),
        records_rejected = summary.records_rejected(),
        superseded = summary.superseded.len(),
        merged = summary.merged_records,
        "Run summary"
    );

    for sheet in summary.sheets.iter().filter(|s| !s.is_processed()) {
        warn!(sheet = %sheet.sheet, status = ?sheet.status, "Sheet rejected");
    }

    for sheet in &summary.sheets {
        for issue in sheet.issues.iter().filter(|i| !i.included) {
            let reasons: Vec<String> = issue.violations.iter().map(|v| v.to_string()).collect();
            warn!(row = %issue.row, farmer_code = ?issue.farmer_code, reasons = ?reasons, "Record rejected");
        }
    }

    if let Some(load) = &summary.load {
        info!(
            batches_committed = load.batches_committed(),
            batches_failed = load.batches_failed(),
            inserted = load.inserted,
            updated = load.updated,
            unchanged = load.unchanged,
            failed = load.failed,
            "Load summary"
        );
        if let Some(abort) = &load.aborted {
            error!(batch = abort.batch, error = %abort.error, "Load stopped before completing");
        }
    }

    if let Some(stats) = &summary.table_stats {
        info!(total = stats.total_records, by_sheet = ?stats.records_by_sheet, "Table statistics");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::canonical::CanonicalField;
    use crate::domain::records::{FarmerRow, LoadBatch};
    use crate::domain::summary::{BatchOutcome, SheetStatus, TableStats};
    use crate::domain::validation::ViolationKind;
    use crate::infrastructure::db::sqlite::SqliteFarmerSink;
    use crate::infrastructure::source::MemorySource;
    use async_trait::async_trait;

    /// SQLite sink whose connection drops after the first batch
    struct DropsAfterFirstBatch(SqliteFarmerSink);

    #[async_trait]
    impl FarmerSink for DropsAfterFirstBatch {
        fn table_name(&self) -> &str {
            self.0.table_name()
        }

        async fn health_check(&self) -> Result<String> {
            self.0.health_check().await
        }

        async fn ensure_schema(&self) -> Result<()> {
            self.0.ensure_schema().await
        }

        async fn upsert_batch(&self, batch: LoadBatch<'_>) -> Result<BatchOutcome> {
            if batch.sequence > 1 {
                return Err(AppError::DatabaseError("connection reset".to_string()));
            }
            self.0.upsert_batch(batch).await
        }

        async fn table_stats(&self) -> Result<TableStats> {
            self.0.table_stats().await
        }

        async fn fetch_farmer(&self, farmer_code: &str) -> Result<Option<FarmerRow>> {
            self.0.fetch_farmer(farmer_code).await
        }
    }

    fn pipeline(config: IngestConfig) -> IngestPipeline {
        IngestPipeline::new(config).unwrap()
    }

    #[test]
    fn test_overlapping_aliases_fail_before_reading() {
        let mut config = IngestConfig::default();
        config
            .aliases
            .insert("farmer_name".to_string(), vec!["Village Name".to_string()]);
        assert!(IngestPipeline::new(config).is_err());
    }

    #[test]
    fn test_rejected_sheet_does_not_stop_others() {
        let mut source = MemorySource::new()
            .with_sheet("broken", &[&["S.no", "Status"], &["1", "Old"]])
            .with_sheet(
                "good",
                &[&["Farmer Code", "Farmer Name", "Village"], &["F001", "Asha", "Kampli"]],
            );

        let run = pipeline(IngestConfig::default()).prepare(&mut source).unwrap();
        assert_eq!(run.summary.sheets_rejected(), 1);
        assert!(matches!(run.summary.sheets[0].status, SheetStatus::Rejected { .. }));
        assert_eq!(run.records.len(), 1);
        assert!(!run.summary.is_total_failure());
    }

    #[test]
    fn test_configured_sheet_order_is_followed() {
        let headers: &[&str] = &["Farmer Code", "Farmer Name", "Village"];
        let mut source = MemorySource::new()
            .with_sheet("A", &[headers, &["F001", "Asha", "Kampli"]])
            .with_sheet("B", &[headers, &["F002", "Bala", "Kurugodu"]]);

        let mut config = IngestConfig::default();
        config.sheet_order = vec!["B".to_string(), "A".to_string(), "C".to_string()];

        let run = pipeline(config).prepare(&mut source).unwrap();
        let codes: Vec<&str> = run.records.iter().map(|r| r.farmer_code.as_str()).collect();
        assert_eq!(codes, vec!["F002", "F001"]);
        assert_eq!(run.summary.sheets[2].sheet, "C");
        assert!(!run.summary.sheets[2].is_processed());
    }

    #[test]
    fn test_keep_last_moves_record_to_later_sheet() {
        let headers: &[&str] = &["Farmer Code", "Farmer Name", "Village"];
        let mut source = MemorySource::new()
            .with_sheet("A", &[headers, &["F001", "Asha", "Kampli"]])
            .with_sheet("B", &[headers, &["F001", "Asha K", "Kampli"]]);

        let mut config = IngestConfig::default();
        config.duplicate_policy = crate::domain::ingest_config::DuplicatePolicy::KeepLast;

        let run = pipeline(config).prepare(&mut source).unwrap();
        assert_eq!(run.records.len(), 1);
        assert_eq!(run.records[0].source_sheet, "B");
        assert_eq!(run.records[0].farmer_name, "Asha K");
        assert_eq!(run.summary.superseded.len(), 1);
        assert_eq!(run.summary.superseded[0].violations[0].rule, ViolationKind::DuplicateKey);
    }

    #[test]
    fn test_unparsable_value_is_reported_but_loaded() {
        let mut source = MemorySource::new().with_sheet(
            "A",
            &[
                &["Farmer Code", "Farmer Name", "Village", "Sync Date"],
                &["F001", "Asha", "Kampli", "31/02/2024"],
            ],
        );

        let run = pipeline(IngestConfig::default()).prepare(&mut source).unwrap();
        assert_eq!(run.records.len(), 1);
        assert_eq!(run.records[0].sync_date, None);
        let issue = &run.summary.sheets[0].issues[0];
        assert!(issue.included);
        assert_eq!(issue.violations[0].field, CanonicalField::SyncDate);
    }

    #[test]
    fn test_discard_rate_drift_is_reported_on_the_sheet() {
        let headers: &[&str] = &["S.no", "Status", "Farmer Code", "Farmer Name", "Village"];
        let rows: Vec<&[&str]> = vec![
            headers,
            &["1", "New", "F001", "Asha", "Kampli"],
            &["2", "New", "F002", "Bala", "Kampli"],
            &["3", "New", "F003", "Chandra", "Kampli"],
            &["4", "New", "F004", "Devi", "Kampli"],
        ];
        let mut source = MemorySource::new()
            .with_sheet("steady", &rows)
            .with_sheet("small", &[headers, &["1", "New", "F005", "Eswar", "Kampli"]]);

        let mut config = IngestConfig::default();
        config.discard_rate.min_rows = 4;

        let run = pipeline(config).prepare(&mut source).unwrap();
        let steady = &run.summary.sheets[0];
        assert_eq!(steady.discarded, 0);
        assert_eq!(steady.warnings.len(), 1);
        assert!(steady.warnings[0].contains("discard rate 0.0%"));
        // Below the minimum row count nothing is judged
        assert!(run.summary.sheets[1].warnings.is_empty());
        assert_eq!(run.records.len(), 5);
    }

    #[tokio::test]
    async fn test_aborted_load_keeps_committed_batches_in_summary() {
        let headers: &[&str] = &["Farmer Code", "Farmer Name", "Village"];
        let mut source = MemorySource::new().with_sheet(
            "A",
            &[
                headers,
                &["F001", "Asha", "Kampli"],
                &["F002", "Bala", "Kampli"],
                &["F003", "Chandra", "Kampli"],
            ],
        );
        let mut config = IngestConfig::default();
        config.batch_size = 2;
        let pipeline = pipeline(config);
        let sink = DropsAfterFirstBatch(
            SqliteFarmerSink::connect("sqlite::memory:", "farmers").await.unwrap(),
        );

        let mut run = pipeline.prepare(&mut source).unwrap();
        let err = pipeline.load(&mut run, &sink, true).await.unwrap_err();
        assert!(matches!(err, AppError::LoadAborted(_)));
        assert!(err.to_string().contains("batch 2"));

        let load = run.summary.load.as_ref().unwrap();
        assert_eq!(load.inserted, 2);
        assert_eq!(load.batches_committed(), 1);
        assert_eq!(load.aborted.as_ref().unwrap().batch, 2);
        assert!(run.summary.table_stats.is_none());
        assert!(sink.fetch_farmer("F002").await.unwrap().is_some());
        assert!(sink.fetch_farmer("F003").await.unwrap().is_none());
    }
}
