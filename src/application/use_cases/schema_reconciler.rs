// ============================================================
// SCHEMA RECONCILER
// ============================================================
// Map one sheet's raw headers onto the canonical fields

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::domain::alias_table::AliasTable;
use crate::domain::canonical::CanonicalField;
use crate::domain::error::SchemaError;

/// Header-to-field mapping for one sheet, computed once and reused per row
#[derive(Debug, Clone)]
pub struct ColumnMap {
    by_field: BTreeMap<CanonicalField, String>,
    unmapped: Vec<String>,
    missing_fields: Vec<CanonicalField>,
}

impl ColumnMap {
    /// Raw header carrying a canonical field in this sheet
    pub fn header_for(&self, field: CanonicalField) -> Option<&str> {
        self.by_field.get(&field).map(|h| h.as_str())
    }

    /// Number of canonical fields with a matching header
    pub fn coverage(&self) -> usize {
        self.by_field.len()
    }

    /// Headers that match no alias; their values are dropped
    pub fn unmapped(&self) -> &[String] {
        &self.unmapped
    }

    /// Optional canonical fields this sheet does not carry
    pub fn missing_fields(&self) -> &[CanonicalField] {
        &self.missing_fields
    }
}

pub struct SchemaReconciler {
    aliases: AliasTable,
}

impl SchemaReconciler {
    pub fn new(aliases: AliasTable) -> Self {
        Self { aliases }
    }

    /// Reconcile a sheet's headers.
    ///
    /// Fails when two headers claim the same field or when a required field
    /// has no header at all. Unmapped headers are only warned about.
    pub fn reconcile(&self, sheet: &str, headers: &[String]) -> Result<ColumnMap, SchemaError> {
        let mut by_field: BTreeMap<CanonicalField, String> = BTreeMap::new();
        let mut unmapped = Vec::new();

        for header in headers {
            if header.trim().is_empty() {
                debug!(sheet = %sheet, "Ignoring blank header");
                continue;
            }

            match self.aliases.lookup(header) {
                Some(field) => {
                    if let Some(first) = by_field.get(&field) {
                        return Err(SchemaError::AmbiguousMapping {
                            sheet: sheet.to_string(),
                            field,
                            first_header: first.clone(),
                            second_header: header.clone(),
                        });
                    }
                    by_field.insert(field, header.clone());
                }
                None => unmapped.push(header.clone()),
            }
        }

        let missing_required: Vec<CanonicalField> = CanonicalField::REQUIRED
            .iter()
            .copied()
            .filter(|field| !by_field.contains_key(field))
            .collect();
        if !missing_required.is_empty() {
            return Err(SchemaError::MissingRequiredColumn {
                sheet: sheet.to_string(),
                fields: missing_required,
            });
        }

        if !unmapped.is_empty() {
            warn!(
                sheet = %sheet,
                headers = ?unmapped,
                "Unmapped headers; their values will be dropped"
            );
        }

        let missing_fields = CanonicalField::ALL
            .iter()
            .copied()
            .filter(|field| !by_field.contains_key(field))
            .collect();

        Ok(ColumnMap {
            by_field,
            unmapped,
            missing_fields,
        })
    }
}
