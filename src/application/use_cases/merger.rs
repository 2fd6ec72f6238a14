// ============================================================
// MERGER
// ============================================================
// Concatenate accepted records across sheets and stamp provenance

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::domain::records::{CanonicalRecord, RecordDraft, RowRef};

/// Collects records in acceptance order under one run-wide timestamp
pub struct Merger {
    imported_at: DateTime<Utc>,
    slots: Vec<Option<CanonicalRecord>>,
    index: HashMap<RowRef, usize>,
}

impl Merger {
    pub fn new(imported_at: DateTime<Utc>) -> Self {
        Self {
            imported_at,
            slots: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn accept(&mut self, row_ref: RowRef, draft: RecordDraft) {
        let record = CanonicalRecord::stamp(draft, &row_ref.sheet, self.imported_at);
        self.index.insert(row_ref, self.slots.len());
        self.slots.push(Some(record));
    }

    /// Withdraw a previously accepted record. Returns false if it was never accepted.
    pub fn retract(&mut self, row_ref: &RowRef) -> bool {
        match self.index.remove(row_ref) {
            Some(slot) => self.slots[slot].take().is_some(),
            None => false,
        }
    }

    pub fn finish(self) -> Vec<CanonicalRecord> {
        self.slots.into_iter().flatten().collect()
    }
}
