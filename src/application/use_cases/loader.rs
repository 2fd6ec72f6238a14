// ============================================================
// LOADER
// ============================================================
// Write merged records to the sink in fixed-size transactional
// batches, continuing past batches the database rejects

use tracing::{error, info, warn};

use crate::domain::error::{AppError, Result};
use crate::domain::records::{CanonicalRecord, LoadBatch};
use crate::domain::summary::{BatchReport, LoadAbort, LoadReport};
use crate::infrastructure::db::FarmerSink;

pub struct Loader<'a> {
    sink: &'a dyn FarmerSink,
    batch_size: usize,
}

impl<'a> Loader<'a> {
    pub fn new(sink: &'a dyn FarmerSink, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(AppError::ConfigError("batch_size must be at least 1".to_string()));
        }
        Ok(Self { sink, batch_size })
    }

    /// Load every record. A connection-level error stops the load and is
    /// kept in `LoadReport::aborted`; batches committed before it stay
    /// committed and counted.
    pub async fn load(&self, records: &[CanonicalRecord]) -> LoadReport {
        let mut report = LoadReport::default();
        let total_batches = records.len().div_ceil(self.batch_size);

        for (index, chunk) in records.chunks(self.batch_size).enumerate() {
            let batch = LoadBatch {
                sequence: index + 1,
                records: chunk,
            };

            let outcome = match self.sink.upsert_batch(batch).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(
                        batch = batch.sequence,
                        of = total_batches,
                        error = %e,
                        "Load aborted; remaining batches not attempted"
                    );
                    report.aborted = Some(LoadAbort {
                        batch: batch.sequence,
                        error: e.to_string(),
                    });
                    break;
                }
            };
            if let Some(failure) = outcome.failed.first() {
                warn!(
                    batch = batch.sequence,
                    records = chunk.len(),
                    farmer_code = %failure.farmer_code,
                    error = %failure.error,
                    "Batch rolled back"
                );
            }

            report.record(BatchReport {
                sequence: batch.sequence,
                records: chunk.len(),
                outcome,
            });

            info!(
                batch = batch.sequence,
                of = total_batches,
                inserted = report.inserted,
                updated = report.updated,
                unchanged = report.unchanged,
                failed = report.failed,
                "Load progress"
            );
        }

        report
    }
}
