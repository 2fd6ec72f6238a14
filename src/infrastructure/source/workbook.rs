use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, DataType, Reader, Sheets};
use tracing::debug;

use super::SheetSource;
use crate::domain::error::{AppError, Result};
use crate::domain::records::RawSheet;

/// xlsx / xlsm / xlsb / xls / ods workbook
pub struct WorkbookSource {
    path: PathBuf,
    workbook: Sheets<BufReader<File>>,
}

impl WorkbookSource {
    pub fn open(path: &Path) -> Result<Self> {
        let workbook = open_workbook_auto(path).map_err(|e| {
            AppError::SourceError(format!("Failed to open workbook {}: {}", path.display(), e))
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            workbook,
        })
    }
}

impl SheetSource for WorkbookSource {
    fn list_sheets(&mut self) -> Result<Vec<String>> {
        Ok(self.workbook.sheet_names().to_vec())
    }

    fn read_sheet(&mut self, name: &str) -> Result<RawSheet> {
        let range = self.workbook.worksheet_range(name).map_err(|e| {
            AppError::SourceError(format!(
                "Failed to read sheet '{}' from {}: {}",
                name,
                self.path.display(),
                e
            ))
        })?;

        let mut rows = range.rows();
        let headers: Vec<String> = match rows.next() {
            Some(header_row) => header_row.iter().map(cell_text).collect(),
            None => {
                return Err(AppError::SourceError(format!("Sheet '{}' is empty", name)));
            }
        };

        let mut sheet = RawSheet::new(name, headers);
        for row in rows {
            sheet.push_values(row.iter().map(cell_text).collect());
        }

        debug!(sheet = %name, rows = sheet.rows.len(), "Read worksheet");
        Ok(sheet)
    }
}

/// Cell as text; date cells become ISO dates
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::DateTime(_) | Data::DateTimeIso(_) => cell
            .as_date()
            .map(|date| date.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| cell.to_string()),
        _ => cell
            .as_string()
            .unwrap_or_else(|| cell.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_text_formats() {
        assert_eq!(cell_text(&Data::Empty), "");
        assert_eq!(cell_text(&Data::String("F001".to_string())), "F001");
        assert_eq!(cell_text(&Data::Float(3.0)), "3");
        assert_eq!(cell_text(&Data::Int(42)), "42");
        assert_eq!(
            cell_text(&Data::DateTimeIso("2024-01-05T00:00:00".to_string())),
            "2024-01-05"
        );
    }

    #[test]
    fn test_missing_workbook_is_a_source_error() {
        let err = WorkbookSource::open(Path::new("/nonexistent/farmers.xlsx")).err().unwrap();
        assert!(matches!(err, AppError::SourceError(_)));
    }
}
