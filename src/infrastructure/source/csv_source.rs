// ============================================================
// CSV SOURCE
// ============================================================
// One CSV file read as a single sheet named after the file stem

use std::fs;
use std::path::Path;

use csv::{ReaderBuilder, Trim};
use encoding_rs::WINDOWS_1252;
use tracing::{debug, warn};

use super::SheetSource;
use crate::domain::error::{AppError, Result};
use crate::domain::records::RawSheet;

pub struct CsvSource {
    sheet_name: String,
    content: String,
    delimiter: u8,
}

impl CsvSource {
    pub fn open(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)
            .map_err(|e| AppError::SourceError(format!("Failed to read {}: {}", path.display(), e)))?;

        let sheet_name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("sheet")
            .to_string();

        Ok(Self::from_content(sheet_name, decode(&bytes)))
    }

    /// Build from text already in memory; the delimiter is detected
    pub fn from_content(sheet_name: impl Into<String>, content: String) -> Self {
        let delimiter = detect_delimiter(&content);
        Self {
            sheet_name: sheet_name.into(),
            content,
            delimiter,
        }
    }
}

impl SheetSource for CsvSource {
    fn list_sheets(&mut self) -> Result<Vec<String>> {
        Ok(vec![self.sheet_name.clone()])
    }

    fn read_sheet(&mut self, name: &str) -> Result<RawSheet> {
        if name != self.sheet_name {
            return Err(AppError::SourceError(format!("No sheet named '{}'", name)));
        }

        let mut reader = ReaderBuilder::new()
            .delimiter(self.delimiter)
            .trim(Trim::All)
            .flexible(true)
            .from_reader(self.content.as_bytes());

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| AppError::ParseError(format!("Failed to read CSV headers: {}", e)))?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_string())
            .collect();

        let mut sheet = RawSheet::new(name, headers);
        for (index, result) in reader.records().enumerate() {
            let record = result.map_err(|e| {
                AppError::ParseError(format!("Failed to parse CSV row {}: {}", index + 1, e))
            })?;
            sheet.push_values(record.iter().map(str::to_string).collect());
        }

        debug!(sheet = %name, rows = sheet.rows.len(), "Read CSV");
        Ok(sheet)
    }
}

/// UTF-8 when valid, otherwise Windows-1252
fn decode(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(content) => content.to_string(),
        Err(_) => {
            let (content, _, had_errors) = WINDOWS_1252.decode(bytes);
            if had_errors {
                warn!("CSV input has bytes outside Windows-1252; replaced");
            }
            content.into_owned()
        }
    }
}

/// Detect delimiter from content (comma, semicolon, tab, pipe)
fn detect_delimiter(content: &str) -> u8 {
    let candidates = [b',', b';', b'\t', b'|'];
    let sample_lines: Vec<_> = content.lines().take(10).collect();
    if sample_lines.is_empty() {
        return b',';
    }

    let mut best_delimiter = b',';
    let mut best_score = 0.0f32;

    for &delimiter in &candidates {
        let field_counts: Vec<usize> = sample_lines
            .iter()
            .map(|line| line.bytes().filter(|&b| b == delimiter).count())
            .collect();

        // Consistent and frequent wins
        let avg = field_counts.iter().sum::<usize>() as f32 / field_counts.len() as f32;
        let variance = field_counts
            .iter()
            .map(|&x| (x as f32 - avg).powi(2))
            .sum::<f32>()
            / field_counts.len() as f32;
        let score = avg / (1.0 + variance.sqrt());

        if score > best_score {
            best_score = score;
            best_delimiter = delimiter;
        }
    }

    best_delimiter
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_reads_rows_under_headers() {
        let mut source = CsvSource::from_content(
            "A",
            "S.no,Status,Farmer Code\n1,New,F001\n2,Old\n".to_string(),
        );
        let sheet = source.read_sheet("A").unwrap();

        assert_eq!(sheet.headers, vec!["S.no", "Status", "Farmer Code"]);
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.rows[0].get("Farmer Code"), Some("F001"));
        assert_eq!(sheet.rows[1].get("Farmer Code"), Some(""));
        assert_eq!(sheet.rows[1].row_ref().position, 2);
    }

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("a,b,c\nd,e,f"), b',');
        assert_eq!(detect_delimiter("a;b;c\nd;e;f"), b';');
        assert_eq!(detect_delimiter("a\tb\tc\nd\te\tf"), b'\t');
    }

    #[test]
    fn test_windows_1252_fallback() {
        // "Gr\xe9" is not UTF-8
        assert_eq!(decode(b"Gr\xe9"), "Gré");
        assert_eq!(decode("Kampli".as_bytes()), "Kampli");
    }

    #[test]
    fn test_open_names_sheet_after_file_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bellary_new.csv");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "Farmer Code;Farmer Name;Village").unwrap();
        writeln!(file, "F001;Asha;Kampli").unwrap();

        let mut source = CsvSource::open(&path).unwrap();
        assert_eq!(source.list_sheets().unwrap(), vec!["bellary_new"]);
        let sheet = source.read_sheet("bellary_new").unwrap();
        assert_eq!(sheet.rows[0].get("Village"), Some("Kampli"));
        assert!(source.read_sheet("other").is_err());
    }
}
