// ============================================================
// SHEET SOURCES
// ============================================================
// Readers that turn spreadsheet files into raw sheets

mod csv_source;
mod memory;
mod workbook;

use std::path::Path;

use crate::domain::error::{AppError, Result};
use crate::domain::records::RawSheet;

pub use csv_source::CsvSource;
pub use memory::MemorySource;
pub use workbook::WorkbookSource;

/// Anything that can list sheets and read one of them as raw rows.
/// The first row of a sheet is its header row.
pub trait SheetSource {
    /// Sheet names in source order
    fn list_sheets(&mut self) -> Result<Vec<String>>;

    fn read_sheet(&mut self, name: &str) -> Result<RawSheet>;
}

/// Pick a reader from the file extension
pub fn open_source(path: &Path) -> Result<Box<dyn SheetSource>> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "csv" | "txt" => Ok(Box::new(CsvSource::open(path)?)),
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Ok(Box::new(WorkbookSource::open(path)?)),
        other => Err(AppError::SourceError(format!(
            "Unsupported input type '{}' for {}",
            other,
            path.display()
        ))),
    }
}
