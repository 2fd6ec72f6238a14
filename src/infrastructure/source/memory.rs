use super::SheetSource;
use crate::domain::error::{AppError, Result};
use crate::domain::records::RawSheet;

/// Sheets held in memory, for embedding callers and tests
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    sheets: Vec<RawSheet>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sheet from string literals; the first row is the header row
    pub fn with_sheet(mut self, name: &str, rows: &[&[&str]]) -> Self {
        let mut rows = rows.iter();
        let headers = rows
            .next()
            .map(|h| h.iter().map(|s| s.to_string()).collect())
            .unwrap_or_default();
        let mut sheet = RawSheet::new(name, headers);
        for row in rows {
            sheet.push_values(row.iter().map(|s| s.to_string()).collect());
        }
        self.sheets.push(sheet);
        self
    }
}

impl SheetSource for MemorySource {
    fn list_sheets(&mut self) -> Result<Vec<String>> {
        Ok(self.sheets.iter().map(|s| s.name.clone()).collect())
    }

    fn read_sheet(&mut self, name: &str) -> Result<RawSheet> {
        self.sheets
            .iter()
            .find(|s| s.name == name)
            .cloned()
            .ok_or_else(|| AppError::SourceError(format!("No sheet named '{}'", name)))
    }
}
