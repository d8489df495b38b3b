//! Intake flow state machine.
//!
//! Pure logic: given the current stage, the accumulated record, and the
//! latest patient utterance (with its per-stage extraction result), the flow
//! decides the next stage, the prompt to speak, and how the record changes.
//! All I/O (speech, transcription, the language model) lives outside.

use super::{ExtractedFields, IntakeRecord, Stage};

/// Tunable flow policy constants.
#[derive(Debug, Clone)]
pub struct FlowPolicy {
    /// Unproductive re-prompts allowed per field before force-advancing.
    pub max_reprompts: u32,
}

impl Default for FlowPolicy {
    fn default() -> Self {
        Self { max_reprompts: 2 }
    }
}

/// One field the flow collects, with its scripted prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldId {
    FullName,
    DateOfBirth,
    Phone,
    ChiefComplaint,
    MedicalHistory,
    Medications,
    Allergies,
}

impl FieldId {
    /// Scripted prompt for this field.
    ///
    /// The conversational collaborator rephrases these; they are also the
    /// deterministic fallback when generation fails.
    pub fn prompt(&self) -> &'static str {
        match self {
            FieldId::FullName => "What's your full name?",
            FieldId::DateOfBirth => "What's your date of birth?",
            FieldId::Phone => "What's the best phone number to reach you?",
            FieldId::ChiefComplaint => "What brings you in today?",
            FieldId::MedicalHistory => {
                "Do you have any ongoing medical conditions, past surgeries, or hospitalizations?"
            }
            FieldId::Medications => "Are you currently taking any medications?",
            FieldId::Allergies => "Do you have any allergies to medications or foods?",
        }
    }

    /// Ordered required fields for a stage.
    pub fn required_for(stage: Stage) -> &'static [FieldId] {
        match stage {
            Stage::Demographics => &[FieldId::FullName, FieldId::DateOfBirth, FieldId::Phone],
            Stage::VisitReason => &[FieldId::ChiefComplaint],
            Stage::MedicalHistory => &[FieldId::MedicalHistory],
            Stage::Medications => &[FieldId::Medications],
            Stage::Allergies => &[FieldId::Allergies],
            Stage::Greeting | Stage::Confirmation | Stage::Complete => &[],
        }
    }
}

/// Result of one flow step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    /// Stage after the step.
    pub stage: Stage,
    /// Scripted prompt the agent should speak (or rephrase).
    pub prompt: String,
    /// True once the flow has reached `Complete`.
    pub is_terminal: bool,
    /// True when a field was force-advanced past without an answer.
    pub flagged: bool,
}

impl StepOutcome {
    fn new(stage: Stage, prompt: impl Into<String>) -> Self {
        Self {
            stage,
            prompt: prompt.into(),
            is_terminal: stage.is_complete(),
            flagged: false,
        }
    }

    fn flagged(mut self) -> Self {
        self.flagged = true;
        self
    }
}

const GREETING_PROMPT: &str = "Hi! I'm MedVoice, your virtual intake assistant. \
    I'll ask you a few questions to prepare for your visit today. \
    This should take about 3 to 4 minutes. Let's start - what's your full name?";

const COMPLETION_PROMPT: &str =
    "Thank you! Your intake is all set. The care team will see you shortly.";

const GO_BACK_MARKERS: &[&str] = &["go back", "previous question", "last question"];
const UNKNOWN_MARKERS: &[&str] = &["i don't know", "i dont know", "not sure", "no idea", "don't remember", "dont remember"];
const AFFIRMATION_MARKERS: &[&str] = &["yes", "yeah", "yep", "correct", "right", "confirm", "that's it", "sounds good"];
const NEGATION_MARKERS: &[&str] = &["no", "nope", "wrong", "incorrect", "not right"];
const CORRECTION_MARKERS: &[&str] = &["no, i said", "i said", "actually", "that's wrong", "not right"];
const NONE_MARKERS: &[&str] = &["none", "nothing", "no allergies", "no medications", "not taking any", "nothing at all"];

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Matches markers on word boundaries so "correct" never fires inside
/// "incorrect" and "right" never fires inside "not right".
fn contains_marker(utterance: &str, markers: &[&str]) -> bool {
    let words = tokenize(utterance);
    markers.iter().any(|marker| {
        let phrase = tokenize(marker);
        words
            .windows(phrase.len().max(1))
            .any(|window| window == phrase.as_slice())
    })
}

/// Negation and correction markers veto affirmation: "no, that's not
/// right" must never read as a yes.
fn is_affirmation(utterance: &str) -> bool {
    contains_marker(utterance, AFFIRMATION_MARKERS)
        && !contains_marker(utterance, NEGATION_MARKERS)
        && !contains_marker(utterance, CORRECTION_MARKERS)
}

fn is_negation(utterance: &str) -> bool {
    contains_marker(utterance, NEGATION_MARKERS)
}

fn is_none_answer(utterance: &str) -> bool {
    contains_marker(utterance, NONE_MARKERS)
        || utterance.trim().eq_ignore_ascii_case("no")
        || utterance.trim().eq_ignore_ascii_case("nope")
}

/// The intake conversation state machine.
///
/// Owns the stage cursor and per-field bookkeeping; the [`IntakeRecord`] it
/// mutates is owned by the session.
#[derive(Debug, Clone)]
pub struct IntakeFlow {
    stage: Stage,
    policy: FlowPolicy,
    /// Unproductive attempts on the field currently being asked.
    reprompts: u32,
    /// Fields force-advanced past, left null.
    skipped: Vec<FieldId>,
    /// List-style stage questions the patient has answered this pass.
    answered: Vec<FieldId>,
    /// Allergies value captured, waiting on the mandatory confirmation.
    awaiting_allergy_confirmation: bool,
}

impl IntakeFlow {
    pub fn new(policy: FlowPolicy) -> Self {
        Self {
            stage: Stage::Greeting,
            policy,
            reprompts: 0,
            skipped: Vec::new(),
            answered: Vec::new(),
            awaiting_allergy_confirmation: false,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Opening line; moves the flow into `Demographics`.
    pub fn greeting(&mut self) -> StepOutcome {
        self.stage = Stage::Demographics;
        StepOutcome::new(self.stage, GREETING_PROMPT)
    }

    /// Advances the flow one step for a patient utterance.
    ///
    /// `extracted` is the per-stage extraction of `utterance`, produced by
    /// the external language collaborator before this call.
    pub fn step(
        &mut self,
        data: &mut IntakeRecord,
        utterance: &str,
        extracted: &ExtractedFields,
    ) -> StepOutcome {
        match self.stage {
            Stage::Greeting => self.greeting(),
            Stage::Complete => StepOutcome::new(Stage::Complete, COMPLETION_PROMPT),
            Stage::Confirmation => self.step_confirmation(data, utterance, extracted),
            Stage::Allergies if self.awaiting_allergy_confirmation => {
                self.step_allergy_confirmation(data, utterance)
            }
            _ => self.step_collecting(data, utterance, extracted),
        }
    }

    /// Handles a silence-timeout tick: re-prompt, or force-advance once the
    /// re-prompt budget is spent.
    pub fn handle_silence(&mut self, data: &mut IntakeRecord) -> StepOutcome {
        if self.stage.is_complete() {
            return StepOutcome::new(Stage::Complete, COMPLETION_PROMPT);
        }
        self.reprompts += 1;
        if self.reprompts > self.policy.max_reprompts {
            return self.force_advance(data);
        }
        StepOutcome::new(self.stage, self.current_prompt(data))
    }

    /// Forces the flow straight to `Complete` (session terminated early).
    pub fn force_complete(&mut self) {
        self.stage = Stage::Complete;
    }

    fn step_collecting(
        &mut self,
        data: &mut IntakeRecord,
        utterance: &str,
        extracted: &ExtractedFields,
    ) -> StepOutcome {
        if contains_marker(utterance, GO_BACK_MARKERS) {
            return self.go_back(data);
        }

        let correction = contains_marker(utterance, CORRECTION_MARKERS);
        let before = data.clone();
        data.merge_extracted(self.stage, extracted, correction);
        let mut progressed = *data != before;

        if contains_marker(utterance, UNKNOWN_MARKERS) {
            self.mark_current_unknown(data);
            progressed = true;
        } else if !progressed && self.is_list_stage() && is_none_answer(utterance) {
            // An explicit "none" answers the whole stage question.
            if let Some(field) = FieldId::required_for(self.stage).first() {
                self.answered.push(*field);
            }
            progressed = true;
        } else if progressed && self.is_list_stage() {
            if let Some(field) = FieldId::required_for(self.stage).first() {
                self.answered.push(*field);
            }
        }

        if !progressed {
            self.reprompts += 1;
            if self.reprompts > self.policy.max_reprompts {
                return self.force_advance(data);
            }
            return StepOutcome::new(self.stage, self.current_prompt(data));
        }

        self.reprompts = 0;
        self.advance_if_satisfied(data)
    }

    fn step_allergy_confirmation(
        &mut self,
        data: &mut IntakeRecord,
        utterance: &str,
    ) -> StepOutcome {
        if is_affirmation(utterance) {
            self.awaiting_allergy_confirmation = false;
            self.enter_stage(Stage::Confirmation, data)
        } else if is_negation(utterance) {
            // Contradiction resets only the allergies sub-section.
            self.awaiting_allergy_confirmation = false;
            self.answered.retain(|f| *f != FieldId::Allergies);
            data.reset_allergies();
            self.reprompts = 0;
            StepOutcome::new(self.stage, FieldId::Allergies.prompt())
        } else {
            self.reprompts += 1;
            if self.reprompts > self.policy.max_reprompts {
                // Keep what was captured and move on.
                self.awaiting_allergy_confirmation = false;
                return self.enter_stage(Stage::Confirmation, data);
            }
            StepOutcome::new(self.stage, self.allergy_confirmation_prompt(data))
        }
    }

    fn step_confirmation(
        &mut self,
        data: &mut IntakeRecord,
        utterance: &str,
        extracted: &ExtractedFields,
    ) -> StepOutcome {
        if contains_marker(utterance, GO_BACK_MARKERS) {
            return self.go_back(data);
        }
        if is_affirmation(utterance) {
            data.confirmed = true;
            self.stage = Stage::Complete;
            return StepOutcome::new(Stage::Complete, COMPLETION_PROMPT);
        }

        // A correction: route the utterance to whichever fields it mentions,
        // then read the summary back again.
        if !extracted.is_empty() {
            for stage in [
                Stage::Demographics,
                Stage::VisitReason,
                Stage::MedicalHistory,
                Stage::Medications,
                Stage::Allergies,
            ] {
                data.merge_extracted(stage, extracted, true);
            }
        }
        StepOutcome::new(Stage::Confirmation, self.readback_prompt(data))
    }

    fn advance_if_satisfied(&mut self, data: &mut IntakeRecord) -> StepOutcome {
        match self.next_missing_field(data) {
            Some(field) => StepOutcome::new(self.stage, field.prompt()),
            None => {
                if self.stage == Stage::Allergies {
                    // Mandatory read-back of the captured allergy answer.
                    self.awaiting_allergy_confirmation = true;
                    return StepOutcome::new(self.stage, self.allergy_confirmation_prompt(data));
                }
                let next = self.stage.next().unwrap_or(Stage::Complete);
                self.enter_stage(next, data)
            }
        }
    }

    fn enter_stage(&mut self, stage: Stage, data: &IntakeRecord) -> StepOutcome {
        self.stage = stage;
        self.reprompts = 0;
        match stage {
            Stage::Confirmation => StepOutcome::new(stage, self.readback_prompt(data)),
            Stage::Complete => StepOutcome::new(stage, COMPLETION_PROMPT),
            _ => {
                // Re-entered stages (go-back) ask the first still-missing
                // field, falling back to the stage's opening question.
                let prompt = self
                    .next_missing_field(data)
                    .or_else(|| FieldId::required_for(stage).first().copied())
                    .map(|f| f.prompt())
                    .unwrap_or(COMPLETION_PROMPT);
                StepOutcome::new(stage, prompt)
            }
        }
    }

    fn go_back(&mut self, data: &IntakeRecord) -> StepOutcome {
        // Exactly one stage backward, never more, and never behind the
        // first data-collection stage.
        let target = self
            .stage
            .prev()
            .filter(|s| *s >= Stage::Demographics)
            .unwrap_or(self.stage);
        self.awaiting_allergy_confirmation = false;
        self.answered
            .retain(|f| !FieldId::required_for(target).contains(f));
        self.skipped
            .retain(|f| !FieldId::required_for(target).contains(f));
        self.enter_stage(target, data)
    }

    fn force_advance(&mut self, data: &mut IntakeRecord) -> StepOutcome {
        self.reprompts = 0;
        if let Some(field) = self.next_missing_field(data) {
            // Leave the field null; the caller records the flag in history.
            self.skipped.push(field);
        }
        let outcome = match self.next_missing_field(data) {
            Some(field) => StepOutcome::new(self.stage, field.prompt()),
            None => {
                if self.stage == Stage::Allergies && !self.answered.contains(&FieldId::Allergies) {
                    let next = self.stage.next().unwrap_or(Stage::Complete);
                    self.enter_stage(next, data)
                } else {
                    self.advance_if_satisfied(data)
                }
            }
        };
        outcome.flagged()
    }

    fn next_missing_field(&self, data: &IntakeRecord) -> Option<FieldId> {
        FieldId::required_for(self.stage)
            .iter()
            .find(|field| !self.skipped.contains(field) && !self.field_answered(**field, data))
            .copied()
    }

    fn field_answered(&self, field: FieldId, data: &IntakeRecord) -> bool {
        match field {
            FieldId::FullName => data.demographics.full_name.is_answered(),
            FieldId::DateOfBirth => data.demographics.date_of_birth.is_answered(),
            FieldId::Phone => data.demographics.phone.is_answered(),
            FieldId::ChiefComplaint => data.visit.chief_complaint.is_answered(),
            FieldId::MedicalHistory | FieldId::Medications | FieldId::Allergies => {
                self.answered.contains(&field)
            }
        }
    }

    fn mark_current_unknown(&mut self, data: &mut IntakeRecord) {
        let Some(field) = self.next_missing_field(data) else {
            return;
        };
        match field {
            FieldId::FullName => data.demographics.full_name.mark_unknown(),
            FieldId::DateOfBirth => data.demographics.date_of_birth.mark_unknown(),
            FieldId::Phone => data.demographics.phone.mark_unknown(),
            FieldId::ChiefComplaint => data.visit.chief_complaint.mark_unknown(),
            FieldId::MedicalHistory | FieldId::Medications | FieldId::Allergies => {
                self.answered.push(field);
            }
        }
    }

    fn is_list_stage(&self) -> bool {
        matches!(
            self.stage,
            Stage::MedicalHistory | Stage::Medications | Stage::Allergies
        )
    }

    fn current_prompt(&self, data: &IntakeRecord) -> String {
        if self.awaiting_allergy_confirmation {
            return self.allergy_confirmation_prompt(data);
        }
        match self.stage {
            Stage::Confirmation => self.readback_prompt(data),
            Stage::Complete => COMPLETION_PROMPT.to_string(),
            Stage::Greeting => GREETING_PROMPT.to_string(),
            _ => self
                .next_missing_field(data)
                .map(|f| f.prompt().to_string())
                .unwrap_or_else(|| COMPLETION_PROMPT.to_string()),
        }
    }

    fn allergy_confirmation_prompt(&self, data: &IntakeRecord) -> String {
        let allergies = &data.allergies;
        if allergies.drug_allergies.is_empty() && allergies.food_allergies.is_empty() {
            "Just to confirm: you have no known allergies. Is that right?".to_string()
        } else {
            let mut all = allergies.drug_allergies.clone();
            all.extend(allergies.food_allergies.clone());
            format!(
                "Just to confirm: you're allergic to {}. Is that right?",
                all.join(", ")
            )
        }
    }

    fn readback_prompt(&self, data: &IntakeRecord) -> String {
        let mut prompt = String::from("Let me read back what I have. ");
        prompt.push_str(&data.summary_lines().join(". "));
        prompt.push_str(". Is everything correct?");
        prompt
    }
}

impl Default for IntakeFlow {
    fn default() -> Self {
        Self::new(FlowPolicy::default())
    }
}
