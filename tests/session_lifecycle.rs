//! End-to-end session lifecycle tests over mock collaborators.

use std::sync::Arc;
use std::time::Duration;

use medvoice::adapters::ai::{MockAgent, MockExtractor};
use medvoice::adapters::speech::{MockStt, MockTts};
use medvoice::adapters::transport::MockTransport;
use medvoice::application::{LifecyclePolicy, SessionLifecycleManager, SessionRegistry};
use medvoice::domain::foundation::SessionId;
use medvoice::domain::intake::{ExtractedFields, FieldValue, IntakeRecord, Speaker, Stage};
use medvoice::domain::session::{Session, SessionStatus};
use medvoice::ports::{RoomInfo, SpeechError, TransportEvent};

struct Harness {
    registry: Arc<SessionRegistry>,
    lifecycle: Arc<SessionLifecycleManager>,
    tts: MockTts,
}

fn harness(transport: MockTransport, stt: MockStt, extractor: MockExtractor) -> Harness {
    let registry = Arc::new(SessionRegistry::new());
    let tts = MockTts::new();
    let policy = LifecyclePolicy {
        max_consecutive_failures: 3,
        // Long enough that silence handling never fires in these tests.
        silence_timeout: Duration::from_secs(60),
        retry_backoff: Duration::from_millis(1),
        ..LifecyclePolicy::default()
    };
    let lifecycle = Arc::new(SessionLifecycleManager::new(
        Arc::clone(&registry),
        Arc::new(transport),
        Arc::new(stt),
        Arc::new(tts.clone()),
        Arc::new(MockAgent::new()),
        Arc::new(extractor),
        policy,
    ));
    Harness {
        registry,
        lifecycle,
        tts,
    }
}

async fn start_session(harness: &Harness) -> SessionId {
    let session = harness
        .registry
        .create(RoomInfo::new("https://rooms.test/e2e"))
        .await;
    harness.lifecycle.start(*session.id()).await.unwrap();
    *session.id()
}

async fn wait_terminal(harness: &Harness, id: SessionId) -> Session {
    for _ in 0..300 {
        let session = harness.registry.get(&id).await.unwrap();
        if session.is_terminal() {
            return session;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("session never reached a terminal status");
}

fn joined() -> TransportEvent {
    TransportEvent::ParticipantJoined {
        participant_id: "patient-1".to_string(),
    }
}

#[tokio::test]
async fn full_intake_reaches_complete_with_confirmed_record() {
    let transport = MockTransport::new().with_event(joined());
    let stt = MockStt::new()
        .with_delay(Duration::from_millis(15))
        .with_utterance("My name is John Smith, born March 15th 1985, phone 555-123-4567")
        .with_utterance("I've had a headache for two days")
        .with_utterance("None")
        .with_utterance("I take lisinopril, 10 milligrams")
        .with_utterance("I'm allergic to penicillin")
        .with_utterance("Yes, that's right")
        .with_utterance("Yes, everything is correct");

    let mut final_record = IntakeRecord::default();
    final_record.demographics.full_name = FieldValue::Value("John Smith".into());
    final_record.demographics.date_of_birth = FieldValue::Value("1985-03-15".into());
    final_record.demographics.phone = FieldValue::Value("555-123-4567".into());
    final_record.visit.chief_complaint = FieldValue::Value("headache".into());
    final_record.allergies.drug_allergies = vec!["penicillin".into()];

    let extractor = MockExtractor::new()
        .with_fields(ExtractedFields {
            full_name: Some("John Smith".into()),
            date_of_birth: Some("1985-03-15".into()),
            phone: Some("555-123-4567".into()),
            ..Default::default()
        })
        .with_fields(ExtractedFields {
            chief_complaint: Some("headache".into()),
            duration: Some("two days".into()),
            ..Default::default()
        })
        .with_fields(ExtractedFields::default())
        .with_fields(ExtractedFields {
            medications: vec![medvoice::domain::intake::Medication {
                name: "lisinopril".into(),
                dosage: Some("10 mg".into()),
            }],
            ..Default::default()
        })
        .with_fields(ExtractedFields {
            drug_allergies: vec!["penicillin".into()],
            ..Default::default()
        })
        .with_record(final_record);

    let harness = harness(transport, stt, extractor);
    let id = start_session(&harness).await;
    let session = wait_terminal(&harness, id).await;

    assert_eq!(session.status(), SessionStatus::Complete);
    assert_eq!(session.stage(), Stage::Complete);
    assert!(session.data().confirmed);
    assert!(!session.data().extraction_failed);
    assert_eq!(
        session.data().demographics.full_name.as_value(),
        Some("John Smith")
    );
    assert_eq!(
        session.data().allergies.drug_allergies,
        vec!["penicillin".to_string()]
    );
    assert!(session.error().is_none());
    assert!(session.completed_at().is_some());

    // The greeting was spoken, and every patient utterance is in history.
    let spoken = harness.tts.spoken();
    assert!(spoken.first().unwrap().contains("MedVoice"));
    let patient_turns = session
        .history()
        .iter()
        .filter(|t| t.speaker == Speaker::Patient)
        .count();
    assert_eq!(patient_turns, 7);
}

#[tokio::test]
async fn participant_leaving_early_abandons_the_session() {
    let transport = MockTransport::new()
        .with_event(joined())
        .with_event(TransportEvent::ParticipantLeft {
            reason: "hangup".to_string(),
        });
    let harness = harness(transport, MockStt::new(), MockExtractor::new());
    let id = start_session(&harness).await;
    let session = wait_terminal(&harness, id).await;

    assert_eq!(session.status(), SessionStatus::Abandoned);
    assert!(!session.data().confirmed);
    assert!(session.error().is_none());
}

#[tokio::test]
async fn transport_error_fails_the_session() {
    let transport = MockTransport::new()
        .with_event(joined())
        .with_event(TransportEvent::Error {
            message: "room exploded".to_string(),
        });
    let harness = harness(transport, MockStt::new(), MockExtractor::new());
    let id = start_session(&harness).await;
    let session = wait_terminal(&harness, id).await;

    assert_eq!(session.status(), SessionStatus::Failed);
    assert!(session.error().unwrap().contains("room exploded"));
}

#[tokio::test]
async fn repeated_recognition_failures_fail_the_session() {
    let transport = MockTransport::new().with_event(joined());
    let stt = MockStt::new()
        .with_delay(Duration::from_millis(10))
        .with_error(SpeechError::network("garbled"))
        .with_error(SpeechError::network("garbled"))
        .with_error(SpeechError::network("garbled"));
    let harness = harness(transport, stt, MockExtractor::new());
    let id = start_session(&harness).await;
    let session = wait_terminal(&harness, id).await;

    assert_eq!(session.status(), SessionStatus::Failed);
    assert!(session.error().unwrap().contains("consecutive"));

    // Fallback phrase was spoken for the recoverable failures only.
    let fallbacks = harness
        .tts
        .spoken()
        .iter()
        .filter(|t| t.contains("didn't catch"))
        .count();
    assert_eq!(fallbacks, 2);
}

#[tokio::test]
async fn extraction_failure_falls_back_to_accumulated_data() {
    let transport = MockTransport::new()
        .with_event(joined())
        .with_event(TransportEvent::ParticipantLeft {
            reason: "hangup".to_string(),
        });
    let stt = MockStt::new().with_utterance("My name is Jane Doe");
    let extractor = MockExtractor::new()
        .with_fields(ExtractedFields {
            full_name: Some("Jane Doe".into()),
            ..Default::default()
        })
        .with_record_error(medvoice::ports::AiError::unavailable("model offline"));

    let harness = harness(transport, stt, extractor);
    let id = start_session(&harness).await;
    let session = wait_terminal(&harness, id).await;

    assert_eq!(session.status(), SessionStatus::Abandoned);
    assert!(session.data().extraction_failed);
}

#[tokio::test]
async fn stop_is_idempotent() {
    let transport = MockTransport::new().with_event(joined());
    let harness = harness(transport, MockStt::new(), MockExtractor::new());
    let id = start_session(&harness).await;

    // Let the greeting land first.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let first = harness.lifecycle.stop(id).await.unwrap();
    let history_after_first = harness.registry.get(&id).await.unwrap().history().len();

    let second = harness.lifecycle.stop(id).await.unwrap();
    let history_after_second = harness.registry.get(&id).await.unwrap().history().len();

    assert_eq!(first, SessionStatus::Abandoned);
    assert_eq!(second, first);
    assert_eq!(history_after_first, history_after_second);
}

#[tokio::test]
async fn silence_reprompts_then_force_advances() {
    let transport = MockTransport::new().with_event(joined());
    let registry = Arc::new(SessionRegistry::new());
    let tts = MockTts::new();
    let policy = LifecyclePolicy {
        max_consecutive_failures: 3,
        silence_timeout: Duration::from_millis(40),
        retry_backoff: Duration::from_millis(1),
        ..LifecyclePolicy::default()
    };
    let lifecycle = Arc::new(SessionLifecycleManager::new(
        Arc::clone(&registry),
        Arc::new(transport),
        Arc::new(MockStt::new()),
        Arc::new(tts.clone()),
        Arc::new(MockAgent::new()),
        Arc::new(MockExtractor::new()),
        policy,
    ));
    let harness = Harness {
        registry,
        lifecycle,
        tts,
    };

    let id = start_session(&harness).await;
    // Enough silence ticks to exhaust the re-prompt budget on the name field.
    tokio::time::sleep(Duration::from_millis(200)).await;
    harness.lifecycle.stop(id).await.unwrap();

    let session = harness.registry.get(&id).await.unwrap();
    let flagged = session.history().iter().filter(|t| t.flagged).count();
    assert!(flagged >= 1, "expected at least one force-advance turn");
}

#[tokio::test]
async fn session_cap_abandons_a_patient_who_never_joins() {
    // No transport events at all: the connection stays open and quiet.
    let transport = MockTransport::new();
    let registry = Arc::new(SessionRegistry::new());
    let tts = MockTts::new();
    let policy = LifecyclePolicy {
        max_consecutive_failures: 3,
        silence_timeout: Duration::from_millis(30),
        max_session_duration: Duration::from_millis(120),
        retry_backoff: Duration::from_millis(1),
        ..LifecyclePolicy::default()
    };
    let lifecycle = Arc::new(SessionLifecycleManager::new(
        Arc::clone(&registry),
        Arc::new(transport),
        Arc::new(MockStt::new()),
        Arc::new(tts.clone()),
        Arc::new(MockAgent::new()),
        Arc::new(MockExtractor::new()),
        policy,
    ));
    let harness = Harness {
        registry,
        lifecycle,
        tts,
    };

    let id = start_session(&harness).await;
    let session = wait_terminal(&harness, id).await;

    assert_eq!(session.status(), SessionStatus::Abandoned);
    assert!(!session.data().confirmed);
    assert!(session.error().is_none());
}

#[tokio::test]
async fn recognition_fallback_turns_are_not_flagged() {
    let transport = MockTransport::new().with_event(joined());
    let stt = MockStt::new()
        .with_delay(Duration::from_millis(10))
        .with_utterance("mumble mumble");
    let extractor = MockExtractor::new()
        .with_stage_error(medvoice::ports::AiError::unavailable("model offline"))
        .with_stage_error(medvoice::ports::AiError::unavailable("model offline"));

    let harness = harness(transport, stt, extractor);
    let id = start_session(&harness).await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    harness.lifecycle.stop(id).await.unwrap();

    let session = harness.registry.get(&id).await.unwrap();
    let fallback = session
        .history()
        .iter()
        .find(|t| t.text.contains("didn't catch"))
        .expect("fallback turn recorded");
    // Flagged turns mark force-advanced fields only.
    assert!(!fallback.flagged);
}

#[tokio::test]
async fn deleting_unknown_session_is_not_found() {
    let harness = harness(MockTransport::new(), MockStt::new(), MockExtractor::new());
    let missing = SessionId::new();
    assert!(harness.lifecycle.stop(missing).await.is_err());
}
