// ============================================================
// CANONICAL CSV EXPORT
// ============================================================

use std::io::Write;
use std::path::Path;

use csv::Writer;

use crate::domain::error::{AppError, Result};
use crate::domain::records::{CanonicalRecord, CANONICAL_COLUMNS};

/// Write merged records to a CSV file in canonical column order
pub fn export_csv(path: &Path, records: &[CanonicalRecord]) -> Result<()> {
    let writer = Writer::from_path(path)
        .map_err(|e| AppError::IoError(format!("Failed to create {}: {}", path.display(), e)))?;
    write_records(writer, records)
}

pub fn write_records<W: Write>(mut writer: Writer<W>, records: &[CanonicalRecord]) -> Result<()> {
    let csv_error = |e: csv::Error| AppError::IoError(format!("Failed to write CSV: {}", e));

    writer.write_record(CANONICAL_COLUMNS).map_err(csv_error)?;
    for record in records {
        writer.write_record(to_fields(record)).map_err(csv_error)?;
    }
    writer
        .flush()
        .map_err(|e| AppError::IoError(format!("Failed to flush CSV: {}", e)))
}

fn to_fields(record: &CanonicalRecord) -> Vec<String> {
    fn opt<T: ToString>(value: &Option<T>) -> String {
        value.as_ref().map(|v| v.to_string()).unwrap_or_default()
    }

    vec![
        opt(&record.serial_number),
        opt(&record.status),
        record.farmer_code.clone(),
        record.farmer_name.clone(),
        opt(&record.govt_id_number),
        opt(&record.primary_contact),
        opt(&record.farmer_created_date),
        opt(&record.plot_created_date),
        opt(&record.sync_date),
        opt(&record.updation_date),
        opt(&record.area),
        opt(&record.gps_area),
        record.village.clone(),
        record.source_sheet.clone(),
        record.imported_at.to_rfc3339(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use chrono::{NaiveDate, TimeZone, Utc};
    use std::str::FromStr;

    #[test]
    fn test_export_writes_header_and_rows() {
        let record = CanonicalRecord {
            serial_number: Some(1),
            status: Some("New".to_string()),
            farmer_code: "F001".to_string(),
            farmer_name: "Asha, K".to_string(),
            govt_id_number: None,
            primary_contact: None,
            farmer_created_date: NaiveDate::from_ymd_opt(2024, 1, 5),
            plot_created_date: None,
            sync_date: None,
            updation_date: None,
            area: Some(BigDecimal::from_str("1.25").unwrap()),
            gps_area: None,
            village: "Kampli".to_string(),
            source_sheet: "A".to_string(),
            imported_at: Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap(),
        };

        let mut buffer = Vec::new();
        write_records(Writer::from_writer(&mut buffer), &[record]).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let mut lines = text.lines();

        assert_eq!(lines.next().unwrap(), CANONICAL_COLUMNS.join(","));
        assert_eq!(
            lines.next().unwrap(),
            "1,New,F001,\"Asha, K\",,,2024-01-05,,,,1.25,,Kampli,A,2024-06-01T08:00:00+00:00"
        );
    }
}
