//! Final-record reconciliation.
//!
//! At session end a full-history extraction pass produces the structured
//! record of record. The per-turn accumulation kept in the session is the
//! safety net: it backfills anything the final pass missed, and stands in
//! entirely when that pass fails.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::intake::{IntakeRecord, Turn};
use crate::ports::IntakeExtractor;

/// Outcome of a reconciliation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledRecord {
    pub record: IntakeRecord,
    /// Present when the full-history pass failed and the accumulated
    /// record was used as-is.
    pub failure: Option<String>,
}

/// Runs the end-of-session extraction and merges it with the record
/// accumulated turn by turn.
pub struct ExtractionEngine {
    extractor: Arc<dyn IntakeExtractor>,
}

impl ExtractionEngine {
    pub fn new(extractor: Arc<dyn IntakeExtractor>) -> Self {
        Self { extractor }
    }

    /// Produces the final record for a session. Never fails: any extraction
    /// error degrades to the accumulated record with `extraction_failed` set.
    pub async fn reconcile(&self, history: &[Turn], accumulated: &IntakeRecord) -> ReconciledRecord {
        if history.is_empty() {
            debug!("no conversation history, keeping accumulated record");
            return ReconciledRecord {
                record: accumulated.clone(),
                failure: None,
            };
        }

        match self.extractor.extract_record(history).await {
            Ok(mut record) => {
                // The full-history pass wins per field; accumulated values
                // only fill the gaps it left.
                record.backfill_from(accumulated);
                record.confirmed = accumulated.confirmed;
                record.extraction_failed = false;
                ReconciledRecord {
                    record,
                    failure: None,
                }
            }
            Err(err) => {
                warn!(error = %err, "final extraction failed, falling back to accumulated record");
                let mut record = accumulated.clone();
                record.extraction_failed = true;
                ReconciledRecord {
                    record,
                    failure: Some(err.to_string()),
                }
            }
        }
    }
}
