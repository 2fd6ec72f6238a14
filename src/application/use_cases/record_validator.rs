// ============================================================
// RECORD VALIDATOR
// ============================================================
// Coerce kept rows into typed drafts, collect every violation,
// and track in-run key uniqueness across sheets

use std::collections::HashMap;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime};
use tracing::debug;

use crate::domain::canonical::CanonicalField;
use crate::domain::ingest_config::{DuplicatePolicy, IngestConfig, UnparsablePolicy};
use crate::domain::records::{MappedRow, RecordDraft, RowRef};
use crate::domain::validation::{ValidationOutcome, Violation, ViolationKind};

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Accept(RecordDraft),
    Reject,
}

/// An earlier record replaced by a later one under keep-last
#[derive(Debug, Clone, PartialEq)]
pub struct Supersession {
    pub row: RowRef,
    pub farmer_code: String,
    pub violation: Violation,
}

#[derive(Debug, Clone)]
pub struct ValidatedRow {
    pub row_ref: RowRef,
    pub farmer_code: Option<String>,
    pub verdict: Verdict,
    pub outcome: ValidationOutcome,
    pub superseded: Vec<Supersession>,
}

impl ValidatedRow {
    pub fn is_accepted(&self) -> bool {
        matches!(self.verdict, Verdict::Accept(_))
    }
}

#[derive(Debug, Clone)]
struct AcceptedKeys {
    farmer_code: String,
    govt_id_number: Option<String>,
}

/// Validates records for one run. Key sets live as long as the instance.
pub struct RecordValidator {
    date_formats: Vec<String>,
    duplicate_policy: DuplicatePolicy,
    unparsable_policy: UnparsablePolicy,
    by_farmer_code: HashMap<String, RowRef>,
    by_govt_id: HashMap<String, RowRef>,
    accepted: HashMap<RowRef, AcceptedKeys>,
}

impl RecordValidator {
    pub fn new(
        date_formats: Vec<String>,
        duplicate_policy: DuplicatePolicy,
        unparsable_policy: UnparsablePolicy,
    ) -> Self {
        Self {
            date_formats,
            duplicate_policy,
            unparsable_policy,
            by_farmer_code: HashMap::new(),
            by_govt_id: HashMap::new(),
            accepted: HashMap::new(),
        }
    }

    pub fn from_config(config: &IngestConfig) -> Self {
        Self::new(
            config.date_formats.clone(),
            config.duplicate_policy,
            config.unparsable_policy,
        )
    }

    pub fn validate(&mut self, row: &MappedRow) -> ValidatedRow {
        let mut outcome = ValidationOutcome::default();

        // Required text fields
        let farmer_code = self.required(row, CanonicalField::FarmerCode, &mut outcome);
        let farmer_name = self.required(row, CanonicalField::FarmerName, &mut outcome);
        let village = self.required(row, CanonicalField::Village, &mut outcome);

        // Typed optional fields
        let serial_number = self.integer(row, CanonicalField::SerialNumber, &mut outcome);
        let farmer_created_date = self.date(row, CanonicalField::FarmerCreatedDate, &mut outcome);
        let plot_created_date = self.date(row, CanonicalField::PlotCreatedDate, &mut outcome);
        let sync_date = self.date(row, CanonicalField::SyncDate, &mut outcome);
        let updation_date = self.date(row, CanonicalField::UpdationDate, &mut outcome);
        let area = self.decimal(row, CanonicalField::Area, &mut outcome);
        let gps_area = self.decimal(row, CanonicalField::GpsArea, &mut outcome);

        let govt_id_number = text(row, CanonicalField::GovtIdNumber);

        let dropped_unparsable = self.unparsable_policy == UnparsablePolicy::Drop && !outcome.is_valid();
        let excluded = outcome.has_blocking() || dropped_unparsable;

        let conflicts = match &farmer_code {
            Some(code) => self.conflicts(code, govt_id_number.as_deref()),
            None => Vec::new(),
        };

        let mut superseded = Vec::new();
        if !conflicts.is_empty() {
            match self.duplicate_policy {
                DuplicatePolicy::DropNew => {
                    for (field, value, earlier) in &conflicts {
                        outcome.push(Violation::new(
                            *field,
                            ViolationKind::DuplicateKey,
                            format!("{} '{}' already accepted from {}", field, value, earlier),
                        ));
                    }
                }
                DuplicatePolicy::KeepLast if !excluded => {
                    for (field, value, earlier) in conflicts {
                        if superseded.iter().any(|s: &Supersession| s.row == earlier) {
                            continue;
                        }
                        if let Some(keys) = self.release(&earlier) {
                            superseded.push(Supersession {
                                row: earlier,
                                farmer_code: keys.farmer_code,
                                violation: Violation::new(
                                    field,
                                    ViolationKind::DuplicateKey,
                                    format!("{} '{}' superseded by {}", field, value, row.row_ref),
                                ),
                            });
                        }
                    }
                }
                DuplicatePolicy::KeepLast => {}
            }
        }

        let include = !outcome.has_blocking() && !dropped_unparsable;

        let verdict = match (include, farmer_code.clone(), farmer_name, village) {
            (true, Some(farmer_code), Some(farmer_name), Some(village)) => {
                self.register(&row.row_ref, &farmer_code, govt_id_number.as_deref());
                Verdict::Accept(RecordDraft {
                    serial_number,
                    status: text(row, CanonicalField::Status),
                    farmer_code,
                    farmer_name,
                    govt_id_number,
                    primary_contact: text(row, CanonicalField::PrimaryContact),
                    farmer_created_date,
                    plot_created_date,
                    sync_date,
                    updation_date,
                    area,
                    gps_area,
                    village,
                })
            }
            _ => Verdict::Reject,
        };

        if !outcome.is_valid() {
            debug!(
                row = %row.row_ref,
                violations = outcome.violations.len(),
                accepted = matches!(verdict, Verdict::Accept(_)),
                "Record has violations"
            );
        }

        ValidatedRow {
            row_ref: row.row_ref.clone(),
            farmer_code,
            verdict,
            outcome,
            superseded,
        }
    }

    fn required(&self, row: &MappedRow, field: CanonicalField, outcome: &mut ValidationOutcome) -> Option<String> {
        let value = text(row, field);
        if value.is_none() {
            outcome.push(Violation::new(
                field,
                ViolationKind::MissingRequired,
                format!("{} is required", field),
            ));
        }
        value
    }

    fn integer(&self, row: &MappedRow, field: CanonicalField, outcome: &mut ValidationOutcome) -> Option<i64> {
        let raw = row.get(field)?;
        let parsed = parse_integer(raw);
        if parsed.is_none() {
            outcome.push(unparsable(field, raw, "an integer"));
        }
        parsed
    }

    fn decimal(&self, row: &MappedRow, field: CanonicalField, outcome: &mut ValidationOutcome) -> Option<BigDecimal> {
        let raw = row.get(field)?;
        match parse_decimal(raw) {
            Some(value) if value < BigDecimal::from(0) => {
                outcome.push(Violation::new(
                    field,
                    ViolationKind::NegativeValue,
                    format!("'{}' is negative", raw),
                ));
                None
            }
            Some(value) => Some(value),
            None => {
                outcome.push(unparsable(field, raw, "a decimal"));
                None
            }
        }
    }

    fn date(&self, row: &MappedRow, field: CanonicalField, outcome: &mut ValidationOutcome) -> Option<NaiveDate> {
        let raw = row.get(field)?;
        let parsed = parse_date(raw, &self.date_formats);
        if parsed.is_none() {
            outcome.push(unparsable(field, raw, "a date in any configured format"));
        }
        parsed
    }

    /// Earlier accepted rows sharing a key with this record
    fn conflicts(&self, farmer_code: &str, govt_id_number: Option<&str>) -> Vec<(CanonicalField, String, RowRef)> {
        let mut found = Vec::new();
        if let Some(earlier) = self.by_farmer_code.get(farmer_code) {
            found.push((CanonicalField::FarmerCode, farmer_code.to_string(), earlier.clone()));
        }
        if let Some(govt_id) = govt_id_number {
            if let Some(earlier) = self.by_govt_id.get(govt_id) {
                found.push((CanonicalField::GovtIdNumber, govt_id.to_string(), earlier.clone()));
            }
        }
        found
    }

    fn register(&mut self, row_ref: &RowRef, farmer_code: &str, govt_id_number: Option<&str>) {
        self.by_farmer_code.insert(farmer_code.to_string(), row_ref.clone());
        if let Some(govt_id) = govt_id_number {
            self.by_govt_id.insert(govt_id.to_string(), row_ref.clone());
        }
        self.accepted.insert(
            row_ref.clone(),
            AcceptedKeys {
                farmer_code: farmer_code.to_string(),
                govt_id_number: govt_id_number.map(str::to_string),
            },
        );
    }

    /// Drop every key held by an earlier record
    fn release(&mut self, row_ref: &RowRef) -> Option<AcceptedKeys> {
        let keys = self.accepted.remove(row_ref)?;
        self.by_farmer_code.remove(&keys.farmer_code);
        if let Some(govt_id) = &keys.govt_id_number {
            self.by_govt_id.remove(govt_id);
        }
        Some(keys)
    }
}

fn text(row: &MappedRow, field: CanonicalField) -> Option<String> {
    row.get(field).map(str::to_string)
}

fn unparsable(field: CanonicalField, raw: &str, expected: &str) -> Violation {
    Violation::new(
        field,
        ViolationKind::UnparsableValue,
        format!("'{}' is not {}", raw, expected),
    )
}

/// Widest decimal exponent accepted in a numeric cell, in either direction
const MAX_EXPONENT: i64 = 18;

/// Parse a decimal whose exponent stays within `MAX_EXPONENT`.
/// `1e9999999` is stored compactly but rescales to ten million digits.
fn bounded_decimal(value: &str) -> Option<BigDecimal> {
    let decimal = BigDecimal::from_str(value).ok()?;
    let (_, scale) = decimal.as_bigint_and_exponent();
    (scale.abs() <= MAX_EXPONENT).then_some(decimal)
}

/// Integer, also accepting integral decimals such as `3.0`
pub fn parse_integer(raw: &str) -> Option<i64> {
    let value = raw.trim();
    if let Ok(parsed) = value.parse::<i64>() {
        return Some(parsed);
    }
    let decimal = bounded_decimal(value)?;
    let whole = decimal.with_scale(0);
    if whole != decimal {
        return None;
    }
    whole.to_string().parse::<i64>().ok()
}

/// Decimal with optional thousands separators
pub fn parse_decimal(raw: &str) -> Option<BigDecimal> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    bounded_decimal(&cleaned)
}

/// First configured format that yields a real calendar date wins
pub fn parse_date(raw: &str, formats: &[String]) -> Option<NaiveDate> {
    let value = raw.trim();
    formats.iter().find_map(|format| {
        NaiveDate::parse_from_str(value, format)
            .ok()
            .or_else(|| NaiveDateTime::parse_from_str(value, format).ok().map(|dt| dt.date()))
    })
}
