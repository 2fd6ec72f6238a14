//! Canonical farmer/plot schema.
//! The set of fields is closed: sheets can only map onto these thirteen slots.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the thirteen canonical slots, declared in external column order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    SerialNumber,
    Status,
    FarmerCode,
    FarmerName,
    GovtIdNumber,
    PrimaryContact,
    FarmerCreatedDate,
    PlotCreatedDate,
    SyncDate,
    UpdationDate,
    Area,
    GpsArea,
    Village,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 13] = [
        CanonicalField::SerialNumber,
        CanonicalField::Status,
        CanonicalField::FarmerCode,
        CanonicalField::FarmerName,
        CanonicalField::GovtIdNumber,
        CanonicalField::PrimaryContact,
        CanonicalField::FarmerCreatedDate,
        CanonicalField::PlotCreatedDate,
        CanonicalField::SyncDate,
        CanonicalField::UpdationDate,
        CanonicalField::Area,
        CanonicalField::GpsArea,
        CanonicalField::Village,
    ];

    /// Fields every sheet must carry and every record must fill
    pub const REQUIRED: [CanonicalField; 3] = [
        CanonicalField::FarmerCode,
        CanonicalField::FarmerName,
        CanonicalField::Village,
    ];

    /// Column name in the target table and the canonical CSV
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SerialNumber => "serial_number",
            Self::Status => "status",
            Self::FarmerCode => "farmer_code",
            Self::FarmerName => "farmer_name",
            Self::GovtIdNumber => "govt_id_number",
            Self::PrimaryContact => "primary_contact",
            Self::FarmerCreatedDate => "farmer_created_date",
            Self::PlotCreatedDate => "plot_created_date",
            Self::SyncDate => "sync_date",
            Self::UpdationDate => "updation_date",
            Self::Area => "area",
            Self::GpsArea => "gps_area",
            Self::Village => "village",
        }
    }

    /// Position in the external column order (0-based)
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CanonicalField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|field| field.as_str() == wanted)
            .ok_or_else(|| format!("Unknown canonical field: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_fields_are_in_column_order() {
        for (position, field) in CanonicalField::ALL.iter().enumerate() {
            assert_eq!(field.index(), position);
        }
        assert_eq!(CanonicalField::ALL.len(), 13);
    }

    #[test]
    fn test_from_str_round_trips_column_names() {
        for field in CanonicalField::ALL {
            assert_eq!(field.as_str().parse::<CanonicalField>().unwrap(), field);
        }
        assert!("plot_owner".parse::<CanonicalField>().is_err());
    }
}
