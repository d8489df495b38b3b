//! Property tests for the intake flow and record merge.
//!
//! Exercises the flow with adversarial input: utterances that carry no
//! recognizable markers and no extractable fields, random correction
//! sequences, and go-back storms.

use proptest::prelude::*;

use medvoice::domain::intake::{
    ExtractedFields, FieldValue, IntakeFlow, IntakeRecord, Stage,
};

fn stage_index(stage: Stage) -> usize {
    Stage::ORDER
        .iter()
        .position(|s| *s == stage)
        .unwrap_or_else(|| panic!("stage {stage} not in flow order"))
}

/// Utterances built from this alphabet cannot spell any flow marker
/// ("yes", "no", "go back", "none", ...).
fn markerless_utterance() -> impl Strategy<Value = String> {
    "[bcdfgjkmpqtvxz ]{1,24}"
}

#[derive(Debug, Clone)]
enum PatientMove {
    Mumble(String),
    GoBack,
    FullAnswer,
}

fn patient_move() -> impl Strategy<Value = PatientMove> {
    prop_oneof![
        3 => markerless_utterance().prop_map(PatientMove::Mumble),
        1 => Just(PatientMove::GoBack),
        2 => Just(PatientMove::FullAnswer),
    ]
}

/// Extraction that answers everything the current stage could ask for.
fn full_answer_fields() -> ExtractedFields {
    ExtractedFields {
        full_name: Some("John Smith".into()),
        date_of_birth: Some("1985-03-15".into()),
        phone: Some("555-123-4567".into()),
        chief_complaint: Some("headache".into()),
        chronic_conditions: vec!["asthma".into()],
        medications: vec![medvoice::domain::intake::Medication {
            name: "albuterol".into(),
            dosage: None,
        }],
        drug_allergies: vec!["penicillin".into()],
        ..Default::default()
    }
}

proptest! {
    /// Without an affirmation at the read-back, the flow never reaches
    /// `Complete`, no matter how many unproductive turns pile up.
    #[test]
    fn gibberish_never_completes_the_flow(utterances in prop::collection::vec(markerless_utterance(), 1..40)) {
        let mut flow = IntakeFlow::default();
        let mut data = IntakeRecord::default();
        flow.greeting();

        for utterance in &utterances {
            let outcome = flow.step(&mut data, utterance, &ExtractedFields::default());
            prop_assert_ne!(outcome.stage, Stage::Complete);
        }
        prop_assert!(!data.confirmed);
    }

    /// Stage order is monotonic modulo a single backward step per go-back.
    #[test]
    fn stage_moves_at_most_one_step_back(moves in prop::collection::vec(patient_move(), 1..40)) {
        let mut flow = IntakeFlow::default();
        let mut data = IntakeRecord::default();
        flow.greeting();

        for patient_move in &moves {
            let before = stage_index(flow.stage());
            let (utterance, fields) = match patient_move {
                PatientMove::Mumble(text) => (text.as_str(), ExtractedFields::default()),
                PatientMove::GoBack => ("go back", ExtractedFields::default()),
                PatientMove::FullAnswer => ("yes, everything", full_answer_fields()),
            };
            let outcome = flow.step(&mut data, utterance, &fields);
            let after = stage_index(outcome.stage);

            prop_assert!(after + 1 >= before, "stage jumped back more than one step");
            prop_assert!(outcome.stage >= Stage::Demographics);
            prop_assert_eq!(outcome.stage, flow.stage());
        }
    }

    /// Merging an empty extraction is a no-op at every stage.
    #[test]
    fn empty_extraction_merge_is_noop(stage_idx in 0usize..Stage::ORDER.len()) {
        let stage = Stage::ORDER[stage_idx];
        let mut record = IntakeRecord::default();
        record.demographics.full_name = FieldValue::Value("Jane Doe".into());
        record.allergies.drug_allergies = vec!["sulfa".into()];
        let before = record.clone();

        record.merge_extracted(stage, &ExtractedFields::default(), false);
        record.merge_extracted(stage, &ExtractedFields::default(), true);

        prop_assert_eq!(record, before);
    }
}

#[test]
fn plain_merge_keeps_the_first_answer() {
    let mut record = IntakeRecord::default();
    record.demographics.full_name = FieldValue::Value("John Smith".into());

    let fields = ExtractedFields {
        full_name: Some("Jon Smythe".into()),
        ..Default::default()
    };
    record.merge_extracted(Stage::Demographics, &fields, false);

    assert_eq!(record.demographics.full_name.as_value(), Some("John Smith"));
}

#[test]
fn correction_merge_replaces_the_answer() {
    let mut record = IntakeRecord::default();
    record.demographics.full_name = FieldValue::Value("John Smith".into());

    let fields = ExtractedFields {
        full_name: Some("Jon Smythe".into()),
        ..Default::default()
    };
    record.merge_extracted(Stage::Demographics, &fields, true);

    assert_eq!(record.demographics.full_name.as_value(), Some("Jon Smythe"));
}

#[test]
fn list_merge_deduplicates() {
    let mut record = IntakeRecord::default();
    let fields = ExtractedFields {
        drug_allergies: vec!["penicillin".into()],
        ..Default::default()
    };
    record.merge_extracted(Stage::Allergies, &fields, false);
    record.merge_extracted(Stage::Allergies, &fields, false);

    assert_eq!(record.allergies.drug_allergies, vec!["penicillin".to_string()]);
}

#[test]
fn forced_walk_through_every_stage_ends_in_confirmation() {
    let mut flow = IntakeFlow::default();
    let mut data = IntakeRecord::default();
    flow.greeting();

    // Exhaust the re-prompt budget at every field without ever answering.
    let mut flagged_steps = 0;
    for _ in 0..60 {
        if flow.stage() == Stage::Confirmation {
            break;
        }
        let outcome = flow.step(&mut data, "kvgdbfttx", &ExtractedFields::default());
        if outcome.flagged {
            flagged_steps += 1;
        }
    }

    assert_eq!(flow.stage(), Stage::Confirmation);
    assert!(flagged_steps >= 1);
    assert!(!data.demographics.full_name.is_answered());
    assert!(!data.confirmed);
}
