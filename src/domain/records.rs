// ============================================================
// RECORD TYPES
// ============================================================
// Rows as read from a sheet, as projected onto the canonical
// schema, and as loaded into the target table

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::canonical::CanonicalField;

/// Where a row came from: sheet name plus 1-based data row position
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowRef {
    pub sheet: String,
    pub position: usize,
}

impl fmt::Display for RowRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} row {}", self.sheet, self.position)
    }
}

/// One data row exactly as the source produced it
#[derive(Debug, Clone)]
pub struct RawRow {
    sheet: String,
    position: usize,
    cells: Vec<(String, String)>,
}

impl RawRow {
    pub fn new(sheet: impl Into<String>, position: usize, cells: Vec<(String, String)>) -> Self {
        Self {
            sheet: sheet.into(),
            position,
            cells,
        }
    }

    /// Build a row by zipping values onto the sheet headers.
    /// Missing trailing cells become empty strings; extra cells are ignored.
    pub fn from_values(sheet: &str, position: usize, headers: &[String], values: Vec<String>) -> Self {
        let mut values = values.into_iter();
        let cells = headers
            .iter()
            .map(|header| (header.clone(), values.next().unwrap_or_default()))
            .collect();
        Self::new(sheet, position, cells)
    }

    pub fn row_ref(&self) -> RowRef {
        RowRef {
            sheet: self.sheet.clone(),
            position: self.position,
        }
    }

    /// Value under an exact raw header
    pub fn get(&self, header: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(name, _)| name == header)
            .map(|(_, value)| value.as_str())
    }
}

/// A sheet read from the source: ordered headers plus its data rows
#[derive(Debug, Clone)]
pub struct RawSheet {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

impl RawSheet {
    pub fn new(name: impl Into<String>, headers: Vec<String>) -> Self {
        Self {
            name: name.into(),
            headers,
            rows: Vec::new(),
        }
    }

    /// Append a row of values in header order; positions are assigned 1, 2, ...
    pub fn push_values(&mut self, values: Vec<String>) {
        let position = self.rows.len() + 1;
        let row = RawRow::from_values(&self.name, position, &self.headers, values);
        self.rows.push(row);
    }
}

/// A raw row projected onto the canonical fields.
/// Values are trimmed; empty cells and null placeholders are `None`.
#[derive(Debug, Clone)]
pub struct MappedRow {
    pub row_ref: RowRef,
    values: [Option<String>; 13],
}

impl MappedRow {
    pub fn new(row_ref: RowRef, values: [Option<String>; 13]) -> Self {
        Self { row_ref, values }
    }

    pub fn get(&self, field: CanonicalField) -> Option<&str> {
        self.values[field.index()].as_deref()
    }

    pub fn is_present(&self, field: CanonicalField) -> bool {
        self.values[field.index()].is_some()
    }
}

/// Typed values of a record that passed validation, before provenance is stamped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordDraft {
    pub serial_number: Option<i64>,
    pub status: Option<String>,
    pub farmer_code: String,
    pub farmer_name: String,
    pub govt_id_number: Option<String>,
    pub primary_contact: Option<String>,
    pub farmer_created_date: Option<NaiveDate>,
    pub plot_created_date: Option<NaiveDate>,
    pub sync_date: Option<NaiveDate>,
    pub updation_date: Option<NaiveDate>,
    pub area: Option<BigDecimal>,
    pub gps_area: Option<BigDecimal>,
    pub village: String,
}

/// The canonical record handed to the loader
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub serial_number: Option<i64>,
    pub status: Option<String>,
    pub farmer_code: String,
    pub farmer_name: String,
    pub govt_id_number: Option<String>,
    pub primary_contact: Option<String>,
    pub farmer_created_date: Option<NaiveDate>,
    pub plot_created_date: Option<NaiveDate>,
    pub sync_date: Option<NaiveDate>,
    pub updation_date: Option<NaiveDate>,
    pub area: Option<BigDecimal>,
    pub gps_area: Option<BigDecimal>,
    pub village: String,
    pub source_sheet: String,
    pub imported_at: DateTime<Utc>,
}

impl CanonicalRecord {
    pub fn stamp(draft: RecordDraft, source_sheet: &str, imported_at: DateTime<Utc>) -> Self {
        Self {
            serial_number: draft.serial_number,
            status: draft.status,
            farmer_code: draft.farmer_code,
            farmer_name: draft.farmer_name,
            govt_id_number: draft.govt_id_number,
            primary_contact: draft.primary_contact,
            farmer_created_date: draft.farmer_created_date,
            plot_created_date: draft.plot_created_date,
            sync_date: draft.sync_date,
            updation_date: draft.updation_date,
            area: draft.area,
            gps_area: draft.gps_area,
            village: draft.village,
            source_sheet: source_sheet.to_string(),
            imported_at,
        }
    }
}

/// Column order of the canonical CSV export
pub const CANONICAL_COLUMNS: [&str; 15] = [
    "serial_number",
    "status",
    "farmer_code",
    "farmer_name",
    "govt_id_number",
    "primary_contact",
    "farmer_created_date",
    "plot_created_date",
    "sync_date",
    "updation_date",
    "area",
    "gps_area",
    "village",
    "source_sheet",
    "imported_at",
];

/// Column order of the target table
pub const TABLE_COLUMNS: [&str; 18] = [
    "id",
    "serial_number",
    "status",
    "farmer_code",
    "farmer_name",
    "govt_id_number",
    "primary_contact",
    "farmer_created_date",
    "plot_created_date",
    "sync_date",
    "updation_date",
    "area",
    "gps_area",
    "village",
    "source_sheet",
    "imported_at",
    "created_at",
    "updated_at",
];

/// A persisted row of the target table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FarmerRow {
    pub id: i64,
    pub record: CanonicalRecord,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A slice of the merged records written in one transaction
#[derive(Debug, Clone, Copy)]
pub struct LoadBatch<'a> {
    /// 1-based batch number within the run
    pub sequence: usize,
    pub records: &'a [CanonicalRecord],
}
