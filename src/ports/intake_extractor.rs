//! Intake extractor port - schema extraction capability of the language
//! collaborator.

use async_trait::async_trait;

use super::AiError;
use crate::domain::intake::{ExtractedFields, IntakeRecord, Stage, Turn};

/// Port for converting free-form speech into structured intake data.
#[async_trait]
pub trait IntakeExtractor: Send + Sync {
    /// Extracts the current stage's fields from a single utterance.
    ///
    /// During `Confirmation` the full flat schema applies, so a correction
    /// can target any field.
    async fn extract_stage_fields(
        &self,
        utterance: &str,
        stage: Stage,
    ) -> Result<ExtractedFields, AiError>;

    /// Reconciles the full turn history into a complete record.
    ///
    /// The primary path of the extraction engine; failures here are
    /// absorbed by the caller's fallback.
    async fn extract_record(&self, history: &[Turn]) -> Result<IntakeRecord, AiError>;
}
