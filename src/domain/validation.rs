use serde::{Deserialize, Serialize};
use std::fmt;

use super::canonical::CanonicalField;

/// Rule a record broke
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViolationKind {
    MissingRequired,
    UnparsableValue,
    NegativeValue,
    DuplicateKey,
}

impl ViolationKind {
    /// Violations that keep a record out of the merged output regardless of policy
    pub fn is_blocking(&self) -> bool {
        matches!(self, Self::MissingRequired | Self::DuplicateKey)
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingRequired => write!(f, "missing_required"),
            Self::UnparsableValue => write!(f, "unparsable_value"),
            Self::NegativeValue => write!(f, "negative_value"),
            Self::DuplicateKey => write!(f, "duplicate_key"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub field: CanonicalField,
    pub rule: ViolationKind,
    pub message: String,
}

impl Violation {
    pub fn new(field: CanonicalField, rule: ViolationKind, message: impl Into<String>) -> Self {
        Self {
            field,
            rule,
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.field, self.rule, self.message)
    }
}

/// Violations collected for one record, in rule order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub violations: Vec<Violation>,
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn push(&mut self, violation: Violation) {
        self.violations.push(violation);
    }

    pub fn has_blocking(&self) -> bool {
        self.violations.iter().any(|v| v.rule.is_blocking())
    }

    pub fn has(&self, rule: ViolationKind) -> bool {
        self.violations.iter().any(|v| v.rule == rule)
    }
}
