//! Structured intake record built up over the conversation.

use serde::{Deserialize, Serialize};

use super::Stage;

/// A scalar intake field.
///
/// Distinguishes a field the patient explicitly could not answer
/// (`Unknown`) from one that was never collected (`Unset`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FieldValue {
    #[default]
    Unset,
    Unknown,
    Value(String),
}

impl FieldValue {
    /// Returns true if the patient has answered, including "I don't know".
    pub fn is_answered(&self) -> bool {
        !matches!(self, FieldValue::Unset)
    }

    /// Returns the collected value, if any.
    pub fn as_value(&self) -> Option<&str> {
        match self {
            FieldValue::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Sets the value if currently unanswered.
    ///
    /// Collected values are never silently cleared; use [`FieldValue::overwrite`]
    /// for an explicit correction.
    pub fn fill(&mut self, value: impl Into<String>) {
        if !self.is_answered() {
            *self = FieldValue::Value(value.into());
        }
    }

    /// Replaces the value unconditionally (explicit correction turn).
    pub fn overwrite(&mut self, value: impl Into<String>) {
        *self = FieldValue::Value(value.into());
    }

    /// Marks the field as explicitly unknown, if not already valued.
    pub fn mark_unknown(&mut self) {
        if !self.is_answered() {
            *self = FieldValue::Unknown;
        }
    }
}

/// Patient demographic information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Demographics {
    pub full_name: FieldValue,
    /// ISO format: YYYY-MM-DD.
    pub date_of_birth: FieldValue,
    pub phone: FieldValue,
    pub email: FieldValue,
}

/// Visit reason and symptom information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Visit {
    pub chief_complaint: FieldValue,
    pub symptoms: Vec<String>,
    pub duration: FieldValue,
    /// Severity on a 1-10 scale.
    pub severity: Option<u8>,
}

/// Patient medical history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MedicalHistory {
    pub chronic_conditions: Vec<String>,
    pub surgeries: Vec<String>,
    pub hospitalizations: Vec<String>,
}

/// Single medication entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Medication {
    pub name: String,
    pub dosage: Option<String>,
}

/// Patient allergy information (critical section).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Allergies {
    pub drug_allergies: Vec<String>,
    pub food_allergies: Vec<String>,
    pub reactions: FieldValue,
}

/// Fields extracted from a single patient utterance.
///
/// Flat across all stages; the per-stage merge in [`IntakeRecord`] only
/// applies the fields belonging to the current stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ExtractedFields {
    pub full_name: Option<String>,
    pub date_of_birth: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub chief_complaint: Option<String>,
    #[serde(default)]
    pub symptoms: Vec<String>,
    pub duration: Option<String>,
    pub severity: Option<u8>,
    #[serde(default)]
    pub chronic_conditions: Vec<String>,
    #[serde(default)]
    pub surgeries: Vec<String>,
    #[serde(default)]
    pub hospitalizations: Vec<String>,
    #[serde(default)]
    pub medications: Vec<Medication>,
    #[serde(default)]
    pub drug_allergies: Vec<String>,
    #[serde(default)]
    pub food_allergies: Vec<String>,
    pub reactions: Option<String>,
}

impl ExtractedFields {
    /// Returns true if no field carries a value.
    pub fn is_empty(&self) -> bool {
        *self == ExtractedFields::default()
    }
}

/// Complete structured output of an intake session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct IntakeRecord {
    pub demographics: Demographics,
    pub visit: Visit,
    pub medical_history: MedicalHistory,
    pub medications: Vec<Medication>,
    pub allergies: Allergies,
    /// Set when the degraded fallback path produced this record.
    pub extraction_failed: bool,
    /// Set once the patient affirmed the read-back.
    pub confirmed: bool,
}

impl IntakeRecord {
    /// Merges extracted fields for the given stage into the record.
    ///
    /// Scalar fields already collected are preserved unless `correction`
    /// is set (explicit correction turn); list fields accumulate without
    /// duplicates.
    pub fn merge_extracted(&mut self, stage: Stage, fields: &ExtractedFields, correction: bool) {
        match stage {
            Stage::Demographics => {
                merge_scalar(&mut self.demographics.full_name, &fields.full_name, correction);
                merge_scalar(
                    &mut self.demographics.date_of_birth,
                    &fields.date_of_birth,
                    correction,
                );
                merge_scalar(&mut self.demographics.phone, &fields.phone, correction);
                merge_scalar(&mut self.demographics.email, &fields.email, correction);
            }
            Stage::VisitReason => {
                merge_scalar(
                    &mut self.visit.chief_complaint,
                    &fields.chief_complaint,
                    correction,
                );
                merge_list(&mut self.visit.symptoms, &fields.symptoms);
                merge_scalar(&mut self.visit.duration, &fields.duration, correction);
                if let Some(severity) = fields.severity {
                    if (1..=10).contains(&severity)
                        && (correction || self.visit.severity.is_none())
                    {
                        self.visit.severity = Some(severity);
                    }
                }
            }
            Stage::MedicalHistory => {
                merge_list(
                    &mut self.medical_history.chronic_conditions,
                    &fields.chronic_conditions,
                );
                merge_list(&mut self.medical_history.surgeries, &fields.surgeries);
                merge_list(
                    &mut self.medical_history.hospitalizations,
                    &fields.hospitalizations,
                );
            }
            Stage::Medications => {
                for med in &fields.medications {
                    if !self.medications.iter().any(|m| m.name == med.name) {
                        self.medications.push(med.clone());
                    }
                }
            }
            Stage::Allergies => {
                merge_list(&mut self.allergies.drug_allergies, &fields.drug_allergies);
                merge_list(&mut self.allergies.food_allergies, &fields.food_allergies);
                merge_scalar(&mut self.allergies.reactions, &fields.reactions, correction);
            }
            Stage::Greeting | Stage::Confirmation | Stage::Complete => {}
        }
    }

    /// Clears only the allergies sub-section (confirmation contradiction).
    pub fn reset_allergies(&mut self) {
        self.allergies = Allergies::default();
    }

    /// Fills this record's null fields from another record.
    ///
    /// Used after full-history extraction so incrementally collected values
    /// survive an extraction that missed them.
    pub fn backfill_from(&mut self, other: &IntakeRecord) {
        backfill_scalar(&mut self.demographics.full_name, &other.demographics.full_name);
        backfill_scalar(
            &mut self.demographics.date_of_birth,
            &other.demographics.date_of_birth,
        );
        backfill_scalar(&mut self.demographics.phone, &other.demographics.phone);
        backfill_scalar(&mut self.demographics.email, &other.demographics.email);
        backfill_scalar(&mut self.visit.chief_complaint, &other.visit.chief_complaint);
        merge_list(&mut self.visit.symptoms, &other.visit.symptoms);
        backfill_scalar(&mut self.visit.duration, &other.visit.duration);
        if self.visit.severity.is_none() {
            self.visit.severity = other.visit.severity;
        }
        merge_list(
            &mut self.medical_history.chronic_conditions,
            &other.medical_history.chronic_conditions,
        );
        merge_list(&mut self.medical_history.surgeries, &other.medical_history.surgeries);
        merge_list(
            &mut self.medical_history.hospitalizations,
            &other.medical_history.hospitalizations,
        );
        for med in &other.medications {
            if !self.medications.iter().any(|m| m.name == med.name) {
                self.medications.push(med.clone());
            }
        }
        merge_list(&mut self.allergies.drug_allergies, &other.allergies.drug_allergies);
        merge_list(&mut self.allergies.food_allergies, &other.allergies.food_allergies);
        backfill_scalar(&mut self.allergies.reactions, &other.allergies.reactions);
    }

    /// Human-readable read-back lines for the confirmation stage.
    ///
    /// Only non-null fields appear.
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(name) = self.demographics.full_name.as_value() {
            lines.push(format!("Name: {}", name));
        }
        if let Some(dob) = self.demographics.date_of_birth.as_value() {
            lines.push(format!("Date of birth: {}", dob));
        }
        if let Some(phone) = self.demographics.phone.as_value() {
            lines.push(format!("Phone: {}", phone));
        }
        if let Some(complaint) = self.visit.chief_complaint.as_value() {
            lines.push(format!("Reason for visit: {}", complaint));
        }
        if !self.visit.symptoms.is_empty() {
            lines.push(format!("Symptoms: {}", self.visit.symptoms.join(", ")));
        }
        if let Some(duration) = self.visit.duration.as_value() {
            lines.push(format!("Duration: {}", duration));
        }
        if !self.medical_history.chronic_conditions.is_empty() {
            lines.push(format!(
                "Conditions: {}",
                self.medical_history.chronic_conditions.join(", ")
            ));
        }
        if !self.medications.is_empty() {
            let meds: Vec<String> = self
                .medications
                .iter()
                .map(|m| match &m.dosage {
                    Some(dosage) => format!("{} ({})", m.name, dosage),
                    None => m.name.clone(),
                })
                .collect();
            lines.push(format!("Medications: {}", meds.join(", ")));
        }
        if self.allergies.drug_allergies.is_empty() && self.allergies.food_allergies.is_empty() {
            lines.push("Allergies: none reported".to_string());
        } else {
            let mut all = self.allergies.drug_allergies.clone();
            all.extend(self.allergies.food_allergies.clone());
            lines.push(format!("Allergies: {}", all.join(", ")));
        }
        lines
    }
}

fn merge_scalar(target: &mut FieldValue, source: &Option<String>, correction: bool) {
    if let Some(value) = source {
        if value.is_empty() {
            return;
        }
        if correction {
            target.overwrite(value.clone());
        } else {
            target.fill(value.clone());
        }
    }
}

fn backfill_scalar(target: &mut FieldValue, source: &FieldValue) {
    if !target.is_answered() && source.is_answered() {
        *target = source.clone();
    }
}

fn merge_list(target: &mut Vec<String>, source: &[String]) {
    for item in source {
        if !item.is_empty() && !target.contains(item) {
            target.push(item.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extracted(f: impl FnOnce(&mut ExtractedFields)) -> ExtractedFields {
        let mut fields = ExtractedFields::default();
        f(&mut fields);
        fields
    }

    #[test]
    fn fill_does_not_clobber_collected_value() {
        let mut field = FieldValue::Value("John Smith".into());
        field.fill("Jane Doe");
        assert_eq!(field.as_value(), Some("John Smith"));
    }

    #[test]
    fn overwrite_replaces_collected_value() {
        let mut field = FieldValue::Value("John Smith".into());
        field.overwrite("Jane Doe");
        assert_eq!(field.as_value(), Some("Jane Doe"));
    }

    #[test]
    fn unknown_is_answered_but_has_no_value() {
        let mut field = FieldValue::Unset;
        field.mark_unknown();
        assert!(field.is_answered());
        assert_eq!(field.as_value(), None);
    }

    #[test]
    fn merge_applies_only_current_stage_fields() {
        let mut record = IntakeRecord::default();
        let fields = extracted(|f| {
            f.full_name = Some("John Smith".into());
            f.chief_complaint = Some("headache".into());
        });

        record.merge_extracted(Stage::Demographics, &fields, false);

        assert_eq!(record.demographics.full_name.as_value(), Some("John Smith"));
        assert!(!record.visit.chief_complaint.is_answered());
    }

    #[test]
    fn merge_without_correction_preserves_existing_scalars() {
        let mut record = IntakeRecord::default();
        record.demographics.phone = FieldValue::Value("555-123-4567".into());

        let fields = extracted(|f| f.phone = Some("555-000-0000".into()));
        record.merge_extracted(Stage::Demographics, &fields, false);

        assert_eq!(record.demographics.phone.as_value(), Some("555-123-4567"));
    }

    #[test]
    fn merge_with_correction_overwrites() {
        let mut record = IntakeRecord::default();
        record.demographics.phone = FieldValue::Value("555-123-4567".into());

        let fields = extracted(|f| f.phone = Some("555-000-0000".into()));
        record.merge_extracted(Stage::Demographics, &fields, true);

        assert_eq!(record.demographics.phone.as_value(), Some("555-000-0000"));
    }

    #[test]
    fn merge_lists_deduplicate() {
        let mut record = IntakeRecord::default();
        let fields = extracted(|f| f.symptoms = vec!["cough".into(), "fever".into()]);
        record.merge_extracted(Stage::VisitReason, &fields, false);
        record.merge_extracted(Stage::VisitReason, &fields, false);

        assert_eq!(record.visit.symptoms, vec!["cough", "fever"]);
    }

    #[test]
    fn severity_outside_scale_is_rejected() {
        let mut record = IntakeRecord::default();
        let fields = extracted(|f| f.severity = Some(12));
        record.merge_extracted(Stage::VisitReason, &fields, false);
        assert_eq!(record.visit.severity, None);
    }

    #[test]
    fn reset_allergies_leaves_other_sections_intact() {
        let mut record = IntakeRecord::default();
        record.demographics.full_name = FieldValue::Value("John Smith".into());
        record.allergies.drug_allergies = vec!["penicillin".into()];

        record.reset_allergies();

        assert!(record.allergies.drug_allergies.is_empty());
        assert_eq!(record.demographics.full_name.as_value(), Some("John Smith"));
    }

    #[test]
    fn backfill_fills_only_null_fields() {
        let mut primary = IntakeRecord::default();
        primary.demographics.full_name = FieldValue::Value("John Smith".into());

        let mut incremental = IntakeRecord::default();
        incremental.demographics.full_name = FieldValue::Value("Wrong Name".into());
        incremental.demographics.phone = FieldValue::Value("555-123-4567".into());

        primary.backfill_from(&incremental);

        assert_eq!(primary.demographics.full_name.as_value(), Some("John Smith"));
        assert_eq!(primary.demographics.phone.as_value(), Some("555-123-4567"));
    }

    #[test]
    fn summary_includes_only_collected_fields() {
        let mut record = IntakeRecord::default();
        record.demographics.full_name = FieldValue::Value("John Smith".into());
        record.visit.chief_complaint = FieldValue::Value("headache".into());

        let lines = record.summary_lines();

        assert!(lines.iter().any(|l| l.contains("John Smith")));
        assert!(lines.iter().any(|l| l.contains("headache")));
        assert!(!lines.iter().any(|l| l.starts_with("Phone")));
        assert!(lines.iter().any(|l| l == "Allergies: none reported"));
    }
}
