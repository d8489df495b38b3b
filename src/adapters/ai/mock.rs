//! Mock AI adapters for testing.
//!
//! Configurable stand-ins for the conversation and extraction ports so tests
//! run without calling Gemini: queued responses, error injection, and call
//! tracking for verification.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::domain::intake::{ExtractedFields, IntakeRecord, Stage, Turn};
use crate::ports::{AiError, ConversationAgent, IntakeExtractor, PromptContext};

/// Mock conversation agent.
///
/// Returns queued responses in order; once the queue is empty it echoes the
/// scripted prompt, which is what a well-behaved generator degrades to.
#[derive(Debug, Clone, Default)]
pub struct MockAgent {
    responses: Arc<Mutex<VecDeque<Result<String, AiError>>>>,
    calls: Arc<Mutex<Vec<PromptContext>>>,
}

impl MockAgent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a successful response.
    pub fn with_response(self, text: impl Into<String>) -> Self {
        self.push(Ok(text.into()));
        self
    }

    /// Queues an error.
    pub fn with_error(self, error: AiError) -> Self {
        self.push(Err(error));
        self
    }

    /// Contexts the agent was called with, in order.
    pub fn calls(&self) -> Vec<PromptContext> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn push(&self, response: Result<String, AiError>) {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(response);
    }
}

#[async_trait]
impl ConversationAgent for MockAgent {
    async fn next_prompt(&self, context: &PromptContext) -> Result<String, AiError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(context.clone());
        let queued = self
            .responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match queued {
            Some(response) => response,
            None => Ok(context.scripted_prompt.clone()),
        }
    }
}

/// Mock extractor.
///
/// Per-turn extractions are served from a queue (empty fields once drained);
/// the full-record pass returns a configured record or an error.
#[derive(Debug, Clone, Default)]
pub struct MockExtractor {
    stage_results: Arc<Mutex<VecDeque<Result<ExtractedFields, AiError>>>>,
    record_result: Arc<Mutex<Option<Result<IntakeRecord, AiError>>>>,
    stage_calls: Arc<Mutex<Vec<(String, Stage)>>>,
}

impl MockExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the extraction result for the next patient turn.
    pub fn with_fields(self, fields: ExtractedFields) -> Self {
        self.stage_results
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Ok(fields));
        self
    }

    /// Queues a per-turn extraction error.
    pub fn with_stage_error(self, error: AiError) -> Self {
        self.stage_results
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Err(error));
        self
    }

    /// Sets the full-record extraction result.
    pub fn with_record(self, record: IntakeRecord) -> Self {
        *self
            .record_result
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(Ok(record));
        self
    }

    /// Makes the full-record pass fail.
    pub fn with_record_error(self, error: AiError) -> Self {
        *self
            .record_result
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(Err(error));
        self
    }

    /// Per-turn calls seen so far, as (utterance, stage) pairs.
    pub fn stage_calls(&self) -> Vec<(String, Stage)> {
        self.stage_calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl IntakeExtractor for MockExtractor {
    async fn extract_stage_fields(
        &self,
        utterance: &str,
        stage: Stage,
    ) -> Result<ExtractedFields, AiError> {
        self.stage_calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((utterance.to_string(), stage));
        let queued = self
            .stage_results
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match queued {
            Some(result) => result,
            None => Ok(ExtractedFields::default()),
        }
    }

    async fn extract_record(&self, _history: &[Turn]) -> Result<IntakeRecord, AiError> {
        let configured = self
            .record_result
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        match configured {
            Some(result) => result,
            None => Ok(IntakeRecord::default()),
        }
    }
}
