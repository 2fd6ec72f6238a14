// ============================================================
// ROW CLASSIFIER
// ============================================================
// Separate genuine records from status-only echo rows

use serde::Serialize;

use crate::application::use_cases::schema_reconciler::ColumnMap;
use crate::domain::canonical::CanonicalField;
use crate::domain::ingest_config::DiscardRateConfig;
use crate::domain::records::{MappedRow, RawRow};

/// Why a row was dropped before validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DiscardReason {
    /// Nothing but (at most) a serial number
    BlankRow,
    /// Only a status label; every entity field is empty
    StatusOnly { status: String },
}

#[derive(Debug, Clone)]
pub enum Classification {
    Keep(MappedRow),
    Discard(DiscardReason),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClassifierStats {
    pub kept: usize,
    pub blank: usize,
    pub status_only: usize,
}

impl ClassifierStats {
    pub fn discarded(&self) -> usize {
        self.blank + self.status_only
    }

    pub fn total(&self) -> usize {
        self.kept + self.discarded()
    }

    pub fn discard_rate(&self) -> f64 {
        if self.total() == 0 {
            0.0
        } else {
            self.discarded() as f64 / self.total() as f64
        }
    }

    /// Data-quality warning when the discard rate leaves the expected band
    pub fn drift_warning(&self, expected: &DiscardRateConfig) -> Option<String> {
        if self.total() == 0 || self.total() < expected.min_rows {
            return None;
        }
        let rate = self.discard_rate();
        if (rate - expected.expected).abs() > expected.tolerance {
            Some(format!(
                "discard rate {:.1}% is outside the expected {:.1}% +/- {:.1}% ({} of {} rows)",
                rate * 100.0,
                expected.expected * 100.0,
                expected.tolerance * 100.0,
                self.discarded(),
                self.total()
            ))
        } else {
            None
        }
    }
}

/// Classifies the rows of one sheet and counts the outcome
pub struct RowClassifier<'a> {
    column_map: &'a ColumnMap,
    null_placeholders: &'a [String],
    stats: ClassifierStats,
}

impl<'a> RowClassifier<'a> {
    pub fn new(column_map: &'a ColumnMap, null_placeholders: &'a [String]) -> Self {
        Self {
            column_map,
            null_placeholders,
            stats: ClassifierStats::default(),
        }
    }

    pub fn stats(&self) -> ClassifierStats {
        self.stats
    }

    /// Project a raw row onto the canonical fields
    pub fn project(&self, row: &RawRow) -> MappedRow {
        let mut values: [Option<String>; 13] = Default::default();
        for field in CanonicalField::ALL {
            values[field.index()] = self
                .column_map
                .header_for(field)
                .and_then(|header| row.get(header))
                .and_then(|raw| self.clean(raw));
        }
        MappedRow::new(row.row_ref(), values)
    }

    /// Keep rows carrying entity data; discard blank and status-only rows
    pub fn classify(&mut self, row: &RawRow) -> Classification {
        let mapped = self.project(row);

        let carries_data = CanonicalField::ALL
            .iter()
            .filter(|field| !matches!(field, CanonicalField::Status | CanonicalField::SerialNumber))
            .any(|field| mapped.is_present(*field));

        if carries_data {
            self.stats.kept += 1;
            return Classification::Keep(mapped);
        }

        match mapped.get(CanonicalField::Status) {
            Some(status) => {
                self.stats.status_only += 1;
                Classification::Discard(DiscardReason::StatusOnly {
                    status: status.to_string(),
                })
            }
            None => {
                self.stats.blank += 1;
                Classification::Discard(DiscardReason::BlankRow)
            }
        }
    }

    /// Trimmed value, or `None` for empty cells and placeholders such as `nan` or `-`
    fn clean(&self, raw: &str) -> Option<String> {
        let value = raw.trim();
        if value.is_empty() {
            return None;
        }
        if self
            .null_placeholders
            .iter()
            .any(|placeholder| placeholder.eq_ignore_ascii_case(value))
        {
            return None;
        }
        if !value.chars().any(|c| c.is_alphanumeric()) {
            return None;
        }
        Some(value.to_string())
    }
}
