//! Gemini adapters for conversation and extraction.
//!
//! Two models behind one wire client: a fast conversational model phrases
//! prompts (temperature 0.7), and a stricter model does structured
//! extraction (temperature 0.1, JSON response mime type). Gemini sometimes
//! wraps JSON output in a markdown fence despite the mime type, so parsing
//! strips fences first.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::AiConfig;
use crate::domain::intake::{
    Allergies, Demographics, ExtractedFields, IntakeRecord, MedicalHistory, Medication, Speaker,
    Stage, Turn, Visit,
};
use crate::ports::{AiError, ConversationAgent, IntakeExtractor, PromptContext};

/// Turns of history included in the conversation request.
const HISTORY_WINDOW: usize = 10;

/// Output caps, matching each model's job.
const CONVERSATION_MAX_TOKENS: u32 = 200;
const EXTRACTION_MAX_TOKENS: u32 = 2000;

/// Shared wire client for the Gemini generateContent API.
#[derive(Clone)]
struct GeminiClient {
    config: AiConfig,
    client: Client,
}

impl GeminiClient {
    fn new(config: AiConfig) -> Result<Self, AiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AiError::network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    fn generate_url(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url, model
        )
    }

    async fn generate(&self, model: &str, request: &GenerateRequest) -> Result<String, AiError> {
        let response = self
            .client
            .post(self.generate_url(model))
            .header("x-goog-api-key", self.config.api_key())
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AiError::Timeout {
                        timeout_secs: self.config.timeout_secs as u32,
                    }
                } else {
                    AiError::network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => AiError::AuthenticationFailed,
                400 => AiError::InvalidRequest(body),
                500..=599 => AiError::unavailable(format!("server error {status}: {body}")),
                _ => AiError::network(format!("unexpected status {status}: {body}")),
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AiError::parse(format!("failed to parse response: {e}")))?;

        let text = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .and_then(|p| p.text)
            .ok_or_else(|| AiError::parse("response contained no text candidate"))?;
        Ok(text)
    }
}

/// Conversational prompt generation via Gemini.
pub struct GeminiAgent {
    client: GeminiClient,
}

impl GeminiAgent {
    pub fn new(config: AiConfig) -> Result<Self, AiError> {
        Ok(Self {
            client: GeminiClient::new(config)?,
        })
    }

    fn system_prompt(context: &PromptContext) -> String {
        let collected =
            serde_json::to_string(&context.collected).unwrap_or_else(|_| "{}".to_string());
        format!(
            "You are MedVoice, a friendly and professional medical intake assistant.\n\
             \n\
             Current intake section: {}\n\
             Data collected so far: {}\n\
             The next question to ask is: \"{}\"\n\
             \n\
             Guidelines:\n\
             - Be warm, empathetic, and professional\n\
             - Ask one question at a time\n\
             - Confirm critical information (especially allergies)\n\
             - Keep responses concise (1-2 sentences)\n\
             - If the patient says something unclear, ask for clarification\n\
             - Never provide medical advice\n\
             \n\
             Phrase the next question naturally, keeping its meaning intact.",
            context.stage, collected, context.scripted_prompt
        )
    }
}

#[async_trait]
impl ConversationAgent for GeminiAgent {
    async fn next_prompt(&self, context: &PromptContext) -> Result<String, AiError> {
        let mut contents = Vec::new();
        let start = context
            .recent_turns
            .len()
            .saturating_sub(HISTORY_WINDOW);
        for turn in &context.recent_turns[start..] {
            contents.push(Content::text(
                match turn.speaker {
                    Speaker::Patient => "user",
                    Speaker::Agent => "model",
                },
                &turn.text,
            ));
        }
        if !context.latest_utterance.is_empty() {
            contents.push(Content::text("user", &context.latest_utterance));
        }

        let request = GenerateRequest {
            contents,
            system_instruction: Some(SystemInstruction::new(Self::system_prompt(context))),
            generation_config: GenerationConfig {
                temperature: 0.7,
                max_output_tokens: CONVERSATION_MAX_TOKENS,
                response_mime_type: None,
            },
        };
        let text = self
            .client
            .generate(&self.client.config.conversation_model, &request)
            .await?;
        debug!(stage = %context.stage, "generated prompt");
        Ok(text.trim().to_string())
    }
}

/// Structured extraction via Gemini.
pub struct GeminiExtractor {
    client: GeminiClient,
}

impl GeminiExtractor {
    pub fn new(config: AiConfig) -> Result<Self, AiError> {
        Ok(Self {
            client: GeminiClient::new(config)?,
        })
    }

    async fn generate_json(&self, prompt: String) -> Result<String, AiError> {
        let request = GenerateRequest {
            contents: vec![Content::text("user", &prompt)],
            system_instruction: None,
            generation_config: GenerationConfig {
                temperature: 0.1,
                max_output_tokens: EXTRACTION_MAX_TOKENS,
                response_mime_type: Some("application/json".to_string()),
            },
        };
        self.client
            .generate(&self.client.config.extraction_model, &request)
            .await
    }

    fn stage_schema(stage: Stage) -> &'static str {
        match stage {
            Stage::Demographics => {
                r#"{"full_name": "string or null", "date_of_birth": "YYYY-MM-DD or null", "phone": "string or null", "email": "string or null"}"#
            }
            Stage::VisitReason => {
                r#"{"chief_complaint": "string or null", "symptoms": ["list of symptoms"], "duration": "string or null", "severity": "1-10 or null"}"#
            }
            Stage::MedicalHistory => {
                r#"{"chronic_conditions": ["list"], "surgeries": ["list"], "hospitalizations": ["list"]}"#
            }
            Stage::Medications => {
                r#"{"medications": [{"name": "string", "dosage": "string or null"}]}"#
            }
            Stage::Allergies => {
                r#"{"drug_allergies": ["list"], "food_allergies": ["list"], "reactions": "string or null"}"#
            }
            // Corrections during the read-back can touch any field.
            Stage::Greeting | Stage::Confirmation | Stage::Complete => {
                r#"{"full_name": "string or null", "date_of_birth": "YYYY-MM-DD or null", "phone": "string or null", "email": "string or null", "chief_complaint": "string or null", "symptoms": ["list"], "duration": "string or null", "severity": "1-10 or null", "chronic_conditions": ["list"], "surgeries": ["list"], "hospitalizations": ["list"], "medications": [{"name": "string", "dosage": "string or null"}], "drug_allergies": ["list"], "food_allergies": ["list"], "reactions": "string or null"}"#
            }
        }
    }
}

#[async_trait]
impl IntakeExtractor for GeminiExtractor {
    async fn extract_stage_fields(
        &self,
        utterance: &str,
        stage: Stage,
    ) -> Result<ExtractedFields, AiError> {
        let prompt = format!(
            "Extract structured data from the patient's response.\n\
             \n\
             Current section: {stage}\n\
             Patient said: \"{utterance}\"\n\
             \n\
             Return a JSON object with these fields (use null for missing values):\n\
             {schema}\n\
             \n\
             Only include fields that were explicitly mentioned. Return valid JSON only.",
            schema = Self::stage_schema(stage),
        );
        let text = self.generate_json(prompt).await?;
        let fields: ExtractedFields = serde_json::from_str(strip_fences(&text))
            .map_err(|e| AiError::parse(format!("malformed extraction JSON: {e}")))?;
        Ok(fields)
    }

    async fn extract_record(&self, history: &[Turn]) -> Result<IntakeRecord, AiError> {
        let prompt = format!("{RECORD_PROMPT}{}", format_conversation(history));
        let text = self.generate_json(prompt).await?;
        let raw: RawRecord = serde_json::from_str(strip_fences(&text))
            .map_err(|e| AiError::parse(format!("malformed record JSON: {e}")))?;
        Ok(raw.into_record())
    }
}

const RECORD_PROMPT: &str = r#"Extract medical intake information from this conversation.
Return a JSON object with the following structure (use null for missing fields):

{
  "demographics": {
    "full_name": "string or null",
    "date_of_birth": "YYYY-MM-DD or null",
    "phone": "string or null",
    "email": "string or null"
  },
  "visit": {
    "chief_complaint": "main reason for visit or null",
    "symptoms": ["list", "of", "symptoms"],
    "duration": "how long symptoms lasted or null",
    "severity": 1-10 or null
  },
  "medical_history": {
    "chronic_conditions": ["diabetes", "hypertension", etc.],
    "surgeries": ["past surgeries"],
    "hospitalizations": ["past hospitalizations"]
  },
  "medications": [
    {"name": "medication name", "dosage": "dosage or null"}
  ],
  "allergies": {
    "drug_allergies": ["penicillin", etc.],
    "food_allergies": ["peanuts", etc.],
    "reactions": "description of reactions or null"
  }
}

Only include information explicitly mentioned in the conversation.
Return valid JSON only, no markdown or explanations.

CONVERSATION:
"#;

fn format_conversation(history: &[Turn]) -> String {
    history
        .iter()
        .map(|turn| match turn.speaker {
            Speaker::Patient => format!("Patient: {}", turn.text),
            Speaker::Agent => format!("Assistant: {}", turn.text),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Strips a surrounding markdown code fence, if present.
fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }
    let without_open = match trimmed.find('\n') {
        Some(idx) => &trimmed[idx + 1..],
        None => return trimmed,
    };
    without_open
        .rfind("```")
        .map(|idx| without_open[..idx].trim())
        .unwrap_or(without_open)
}

// --- Wire format ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn text(role: &str, text: &str) -> Self {
        Self {
            role: role.to_string(),
            parts: vec![Part {
                text: Some(text.to_string()),
            }],
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

impl SystemInstruction {
    fn new(text: String) -> Self {
        Self {
            parts: vec![Part { text: Some(text) }],
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

/// Record shape as the model emits it: plain strings and nulls, which map
/// onto the tri-state fields of [`IntakeRecord`].
#[derive(Debug, Default, Deserialize)]
struct RawRecord {
    #[serde(default)]
    demographics: RawDemographics,
    #[serde(default)]
    visit: RawVisit,
    #[serde(default)]
    medical_history: RawMedicalHistory,
    #[serde(default)]
    medications: Vec<Medication>,
    #[serde(default)]
    allergies: RawAllergies,
}

#[derive(Debug, Default, Deserialize)]
struct RawDemographics {
    full_name: Option<String>,
    date_of_birth: Option<String>,
    phone: Option<String>,
    email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawVisit {
    chief_complaint: Option<String>,
    #[serde(default)]
    symptoms: Vec<String>,
    duration: Option<String>,
    severity: Option<u8>,
}

#[derive(Debug, Default, Deserialize)]
struct RawMedicalHistory {
    #[serde(default)]
    chronic_conditions: Vec<String>,
    #[serde(default)]
    surgeries: Vec<String>,
    #[serde(default)]
    hospitalizations: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawAllergies {
    #[serde(default)]
    drug_allergies: Vec<String>,
    #[serde(default)]
    food_allergies: Vec<String>,
    reactions: Option<String>,
}

impl RawRecord {
    fn into_record(self) -> IntakeRecord {
        IntakeRecord {
            demographics: Demographics {
                full_name: field(self.demographics.full_name),
                date_of_birth: field(self.demographics.date_of_birth),
                phone: field(self.demographics.phone),
                email: field(self.demographics.email),
            },
            visit: Visit {
                chief_complaint: field(self.visit.chief_complaint),
                symptoms: self.visit.symptoms,
                duration: field(self.visit.duration),
                severity: self.visit.severity.filter(|s| (1..=10).contains(s)),
            },
            medical_history: MedicalHistory {
                chronic_conditions: self.medical_history.chronic_conditions,
                surgeries: self.medical_history.surgeries,
                hospitalizations: self.medical_history.hospitalizations,
            },
            medications: self.medications,
            allergies: Allergies {
                drug_allergies: self.allergies.drug_allergies,
                food_allergies: self.allergies.food_allergies,
                reactions: field(self.allergies.reactions),
            },
            extraction_failed: false,
            confirmed: false,
        }
    }
}

fn field(value: Option<String>) -> crate::domain::intake::FieldValue {
    use crate::domain::intake::FieldValue;
    match value {
        Some(v) if !v.trim().is_empty() => FieldValue::Value(v),
        _ => FieldValue::Unset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_fences_handles_plain_json() {
        assert_eq!(strip_fences(r#"{"a": 1}"#), r#"{"a": 1}"#);
    }

    #[test]
    fn strip_fences_removes_markdown_block() {
        let fenced = "```json\n{\"full_name\": \"John Smith\"}\n```";
        assert_eq!(strip_fences(fenced), r#"{"full_name": "John Smith"}"#);
    }

    #[test]
    fn strip_fences_tolerates_missing_closing_fence() {
        let fenced = "```json\n{\"a\": 1}";
        assert_eq!(strip_fences(fenced), r#"{"a": 1}"#);
    }

    #[test]
    fn raw_record_maps_nulls_to_unset() {
        let raw: RawRecord = serde_json::from_str(
            r#"{
                "demographics": {"full_name": "Jane Doe", "date_of_birth": null, "phone": null, "email": null},
                "visit": {"chief_complaint": "headache", "symptoms": ["nausea"], "duration": "2 days", "severity": 7},
                "medical_history": {"chronic_conditions": [], "surgeries": [], "hospitalizations": []},
                "medications": [],
                "allergies": {"drug_allergies": ["penicillin"], "food_allergies": [], "reactions": null}
            }"#,
        )
        .unwrap();
        let record = raw.into_record();
        assert_eq!(record.demographics.full_name.as_value(), Some("Jane Doe"));
        assert!(!record.demographics.date_of_birth.is_answered());
        assert_eq!(record.visit.severity, Some(7));
        assert_eq!(record.allergies.drug_allergies, vec!["penicillin"]);
    }

    #[test]
    fn raw_record_discards_out_of_range_severity() {
        let raw: RawRecord = serde_json::from_str(
            r#"{"visit": {"chief_complaint": null, "symptoms": [], "duration": null, "severity": 15}}"#,
        )
        .unwrap();
        assert_eq!(raw.into_record().visit.severity, None);
    }

    #[test]
    fn stage_schema_is_scoped_per_stage() {
        assert!(GeminiExtractor::stage_schema(Stage::Demographics).contains("full_name"));
        assert!(!GeminiExtractor::stage_schema(Stage::Demographics).contains("drug_allergies"));
        assert!(GeminiExtractor::stage_schema(Stage::Confirmation).contains("drug_allergies"));
    }

    #[test]
    fn conversation_formatting_labels_speakers() {
        let history = vec![
            Turn::agent("What's your full name?", Stage::Demographics),
            Turn::patient("John Smith", Stage::Demographics),
        ];
        let text = format_conversation(&history);
        assert_eq!(text, "Assistant: What's your full name?\nPatient: John Smith");
    }
}
