// ============================================================
// RUN REPORTING
// ============================================================
// Per-sheet, per-batch and per-run counters reported at the end
// of every ingest, whether or not everything succeeded

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::canonical::CanonicalField;
use super::records::RowRef;
use super::validation::Violation;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SheetStatus {
    Processed,
    Rejected { reason: String },
}

/// A record that drew at least one violation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordIssue {
    pub row: RowRef,
    pub farmer_code: Option<String>,
    /// Whether the record still made it into the merged output
    pub included: bool,
    pub violations: Vec<Violation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetReport {
    pub sheet: String,
    pub status: SheetStatus,
    pub rows_read: usize,
    pub kept: usize,
    pub discarded: usize,
    pub blank_rows: usize,
    pub status_only_rows: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub unmapped_headers: Vec<String>,
    pub missing_fields: Vec<CanonicalField>,
    pub warnings: Vec<String>,
    pub issues: Vec<RecordIssue>,
}

impl SheetReport {
    pub fn new(sheet: impl Into<String>) -> Self {
        Self {
            sheet: sheet.into(),
            status: SheetStatus::Processed,
            rows_read: 0,
            kept: 0,
            discarded: 0,
            blank_rows: 0,
            status_only_rows: 0,
            accepted: 0,
            rejected: 0,
            unmapped_headers: Vec::new(),
            missing_fields: Vec::new(),
            warnings: Vec::new(),
            issues: Vec::new(),
        }
    }

    pub fn rejected_sheet(sheet: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            status: SheetStatus::Rejected {
                reason: reason.into(),
            },
            ..Self::new(sheet)
        }
    }

    pub fn is_processed(&self) -> bool {
        self.status == SheetStatus::Processed
    }
}

/// A record the sink refused, identified by its key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedRecord {
    pub farmer_code: String,
    pub error: String,
}

/// Result of writing one batch.
/// When `failed` is non-empty the transaction was rolled back and nothing
/// from the batch was committed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: Vec<FailedRecord>,
}

impl BatchOutcome {
    pub fn is_committed(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub sequence: usize,
    pub records: usize,
    pub outcome: BatchOutcome,
}

/// Connection-level failure that stopped a load part-way
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadAbort {
    /// Batch that was being written; it and every later batch were not committed
    pub batch: usize,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoadReport {
    pub batches: Vec<BatchReport>,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Records in rolled-back batches
    pub failed: usize,
    pub aborted: Option<LoadAbort>,
}

impl LoadReport {
    pub fn record(&mut self, report: BatchReport) {
        if report.outcome.is_committed() {
            self.inserted += report.outcome.inserted;
            self.updated += report.outcome.updated;
            self.unchanged += report.outcome.unchanged;
        } else {
            self.failed += report.records;
        }
        self.batches.push(report);
    }

    pub fn batches_committed(&self) -> usize {
        self.batches.iter().filter(|b| b.outcome.is_committed()).count()
    }

    pub fn batches_failed(&self) -> usize {
        self.batches.len() - self.batches_committed()
    }
}

/// Row counts of the target table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableStats {
    pub total_records: i64,
    pub records_by_sheet: Vec<(String, i64)>,
    pub records_by_status: Vec<(Option<String>, i64)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub imported_at: DateTime<Utc>,
    pub sheets: Vec<SheetReport>,
    /// Records accepted earlier in the run and later replaced under keep-last
    pub superseded: Vec<RecordIssue>,
    pub merged_records: usize,
    pub load: Option<LoadReport>,
    pub table_stats: Option<TableStats>,
}

impl RunSummary {
    pub fn new(imported_at: DateTime<Utc>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            imported_at,
            sheets: Vec::new(),
            superseded: Vec::new(),
            merged_records: 0,
            load: None,
            table_stats: None,
        }
    }

    pub fn sheets_processed(&self) -> usize {
        self.sheets.iter().filter(|s| s.is_processed()).count()
    }

    pub fn sheets_rejected(&self) -> usize {
        self.sheets.len() - self.sheets_processed()
    }

    pub fn rows_discarded(&self) -> usize {
        self.sheets.iter().map(|s| s.discarded).sum()
    }

    pub fn records_accepted(&self) -> usize {
        self.sheets.iter().map(|s| s.accepted).sum()
    }

    pub fn records_rejected(&self) -> usize {
        self.sheets.iter().map(|s| s.rejected).sum()
    }

    /// No sheet made it through reconciliation
    pub fn is_total_failure(&self) -> bool {
        self.sheets_processed() == 0
    }
}
