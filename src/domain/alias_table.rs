// ============================================================
// ALIAS TABLE
// ============================================================
// Accepted raw header spellings per canonical field

use std::collections::{BTreeMap, HashMap};

use super::canonical::CanonicalField;
use super::error::{AppError, Result};

/// Normalize a header for comparison: trim, collapse inner whitespace, lowercase
pub fn normalize_header(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Header spellings observed across the district sheets
pub fn default_aliases() -> BTreeMap<CanonicalField, Vec<String>> {
    let table: [(CanonicalField, &[&str]); 13] = [
        (
            CanonicalField::SerialNumber,
            &["S.no", "S.No.", "S No", "Sl.No", "Sl No", "Sl. No.", "Sr No", "Serial No", "Serial Number"],
        ),
        (CanonicalField::Status, &["Status", "Farmer Status", "Plot Status"]),
        (CanonicalField::FarmerCode, &["Farmer Code", "FarmerCode", "Farmer Id", "Farmer ID Code"]),
        (CanonicalField::FarmerName, &["Farmer Name", "FarmerName", "Name", "Name of Farmer"]),
        (
            CanonicalField::GovtIdNumber,
            &["Govt id num", "Govt ID Number", "Govt Id No", "Government ID", "Aadhaar Number"],
        ),
        (
            CanonicalField::PrimaryContact,
            &["Primary Contact", "Contact Number", "Mobile", "Mobile Number", "Phone"],
        ),
        (CanonicalField::FarmerCreatedDate, &["Farmer Created Date", "Farmer Creation Date"]),
        (CanonicalField::PlotCreatedDate, &["Plot Created Date", "Plot Creation Date"]),
        (CanonicalField::SyncDate, &["Sync Date", "Synced Date", "Last Sync Date"]),
        (CanonicalField::UpdationDate, &["Updation Date", "Updated Date", "Last Updated"]),
        (CanonicalField::Area, &["Area", "Plot Area", "Area (Acres)"]),
        (CanonicalField::GpsArea, &["GPS Area", "Gps Area (Acres)", "GPS Area (Acres)"]),
        (CanonicalField::Village, &["Village", "Village Name", "Gram"]),
    ];

    table
        .iter()
        .map(|(field, aliases)| (*field, aliases.iter().map(|a| a.to_string()).collect()))
        .collect()
}

/// Validated, immutable alias lookup.
///
/// Every canonical field name is an implicit alias of its own field, so a
/// previously exported canonical CSV reconciles without extra configuration.
/// Alias sets are pairwise disjoint after normalization.
#[derive(Debug, Clone)]
pub struct AliasTable {
    by_alias: HashMap<String, CanonicalField>,
}

impl AliasTable {
    /// Build the table, failing on any alias claimed by two fields
    pub fn new(aliases: &BTreeMap<CanonicalField, Vec<String>>) -> Result<Self> {
        let mut by_alias: HashMap<String, CanonicalField> = HashMap::new();

        let implicit = CanonicalField::ALL
            .iter()
            .map(|field| (*field, field.as_str().to_string()));
        let configured = aliases
            .iter()
            .flat_map(|(field, list)| list.iter().map(move |alias| (*field, alias.clone())));

        for (field, alias) in implicit.chain(configured) {
            let normalized = normalize_header(&alias);
            if normalized.is_empty() {
                return Err(AppError::ConfigError(format!(
                    "blank alias configured for '{}'",
                    field
                )));
            }

            match by_alias.get(&normalized) {
                Some(existing) if *existing != field => {
                    return Err(AppError::ConfigError(format!(
                        "alias '{}' is claimed by both '{}' and '{}'",
                        normalized, existing, field
                    )));
                }
                Some(_) => {}
                None => {
                    by_alias.insert(normalized, field);
                }
            }
        }

        Ok(Self { by_alias })
    }

    /// Canonical field a raw header stands for, if any
    pub fn lookup(&self, raw_header: &str) -> Option<CanonicalField> {
        self.by_alias.get(&normalize_header(raw_header)).copied()
    }

    pub fn alias_count(&self) -> usize {
        self.by_alias.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header("  Farmer   Code "), "farmer code");
        assert_eq!(normalize_header("GPS\tArea"), "gps area");
        assert_eq!(normalize_header("   "), "");
    }

    #[test]
    fn test_default_table_is_disjoint() {
        let table = AliasTable::new(&default_aliases()).unwrap();
        assert!(table.alias_count() > CanonicalField::ALL.len());
    }

    #[test]
    fn test_lookup_is_case_and_space_insensitive() {
        let table = AliasTable::new(&default_aliases()).unwrap();
        assert_eq!(table.lookup("FARMER  CODE"), Some(CanonicalField::FarmerCode));
        assert_eq!(table.lookup(" village name "), Some(CanonicalField::Village));
        assert_eq!(table.lookup("farmer_code"), Some(CanonicalField::FarmerCode));
        assert_eq!(table.lookup("Remarks"), None);
    }

    #[test]
    fn test_overlapping_aliases_fail() {
        let mut aliases = default_aliases();
        aliases
            .get_mut(&CanonicalField::FarmerName)
            .unwrap()
            .push("village name".to_string());

        let err = AliasTable::new(&aliases).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("village name"));
        assert!(message.contains("village"));
        assert!(message.contains("farmer_name"));
    }

    #[test]
    fn test_alias_clashing_with_canonical_name_fails() {
        let mut aliases = BTreeMap::new();
        aliases.insert(CanonicalField::Status, vec!["sync_date".to_string()]);
        assert!(AliasTable::new(&aliases).is_err());
    }

    #[test]
    fn test_repeated_alias_for_same_field_is_fine() {
        let mut aliases = BTreeMap::new();
        aliases.insert(
            CanonicalField::Village,
            vec!["Village".to_string(), "VILLAGE ".to_string()],
        );
        let table = AliasTable::new(&aliases).unwrap();
        assert_eq!(table.alias_count(), CanonicalField::ALL.len());
        assert_eq!(table.lookup("VILLAGE"), Some(CanonicalField::Village));
    }
}
