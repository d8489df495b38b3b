//! Session aggregate: one intake attempt.

use serde::{Deserialize, Serialize};

use super::{SessionError, SessionStatus};
use crate::domain::foundation::{SessionId, StateMachine, Timestamp};
use crate::domain::intake::{IntakeRecord, Stage, Turn};

/// One intake attempt, owned exclusively by the session registry.
///
/// Invariants enforced here:
/// - `history` is append-only and only grows while the session is active;
/// - `status` transitions are monotonic (`Active` to a terminal status, once);
/// - `stage` moves one step at a time except for the jump to `Complete`;
/// - `error` is set only together with `Failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    id: SessionId,
    status: SessionStatus,
    stage: Stage,
    data: IntakeRecord,
    history: Vec<Turn>,
    error: Option<String>,
    created_at: Timestamp,
    completed_at: Option<Timestamp>,
}

impl Session {
    /// Creates a new active session in the greeting stage.
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            status: SessionStatus::Active,
            stage: Stage::Greeting,
            data: IntakeRecord::default(),
            history: Vec::new(),
            error: None,
            created_at: Timestamp::now(),
            completed_at: None,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn data(&self) -> &IntakeRecord {
        &self.data
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn created_at(&self) -> &Timestamp {
        &self.created_at
    }

    pub fn completed_at(&self) -> Option<&Timestamp> {
        self.completed_at.as_ref()
    }

    /// Returns true if the session has reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Appends a turn to the history.
    ///
    /// Rejected once the session is terminal so `stop` stays idempotent.
    pub fn record_turn(&mut self, turn: Turn) -> Result<(), SessionError> {
        if self.is_terminal() {
            return Err(SessionError::already_terminal(self.status));
        }
        self.history.push(turn);
        Ok(())
    }

    /// Moves the stage cursor.
    ///
    /// Staying put is always allowed; otherwise the stage state machine
    /// decides (one step forward/backward, or a forced jump to `Complete`).
    pub fn advance_stage(&mut self, stage: Stage) -> Result<(), SessionError> {
        if self.is_terminal() {
            return Err(SessionError::already_terminal(self.status));
        }
        if stage == self.stage {
            return Ok(());
        }
        if !self.stage.can_transition_to(&stage) {
            return Err(SessionError::invalid_stage_transition(format!(
                "{} -> {}",
                self.stage, stage
            )));
        }
        self.stage = stage;
        Ok(())
    }

    /// Replaces the accumulated intake data.
    pub fn set_data(&mut self, data: IntakeRecord) -> Result<(), SessionError> {
        if self.is_terminal() {
            return Err(SessionError::already_terminal(self.status));
        }
        self.data = data;
        Ok(())
    }

    /// Installs the final reconciled record. Allowed exactly once, as part
    /// of terminating, so it bypasses the terminal guard.
    pub fn finalize_data(&mut self, data: IntakeRecord) {
        self.data = data;
    }

    /// Marks the session complete.
    pub fn complete(&mut self) -> Result<(), SessionError> {
        self.terminate(SessionStatus::Complete, None)
    }

    /// Marks the session abandoned (patient left early).
    pub fn abandon(&mut self) -> Result<(), SessionError> {
        self.terminate(SessionStatus::Abandoned, None)
    }

    /// Marks the session failed with a reason.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), SessionError> {
        self.terminate(SessionStatus::Failed, Some(reason.into()))
    }

    fn terminate(
        &mut self,
        status: SessionStatus,
        error: Option<String>,
    ) -> Result<(), SessionError> {
        let next = self
            .status
            .transition_to(status)
            .map_err(|_| SessionError::already_terminal(self.status))?;
        self.status = next;
        self.error = error;
        self.stage = Stage::Complete;
        self.completed_at = Some(Timestamp::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::intake::FieldValue;

    fn session() -> Session {
        Session::new(SessionId::new())
    }

    #[test]
    fn new_session_is_active_at_greeting() {
        let s = session();
        assert_eq!(s.status(), SessionStatus::Active);
        assert_eq!(s.stage(), Stage::Greeting);
        assert!(s.history().is_empty());
        assert!(s.error().is_none());
        assert!(s.completed_at().is_none());
    }

    #[test]
    fn history_is_append_only_while_active() {
        let mut s = session();
        s.record_turn(Turn::agent("hello", Stage::Greeting)).unwrap();
        s.record_turn(Turn::patient("hi", Stage::Greeting)).unwrap();
        assert_eq!(s.history().len(), 2);
    }

    #[test]
    fn terminal_session_rejects_new_turns() {
        let mut s = session();
        s.abandon().unwrap();
        let err = s.record_turn(Turn::patient("hi", Stage::Greeting));
        assert_eq!(
            err,
            Err(SessionError::already_terminal(SessionStatus::Abandoned))
        );
    }

    #[test]
    fn stage_advances_one_step_at_a_time() {
        let mut s = session();
        s.advance_stage(Stage::Demographics).unwrap();
        assert!(s.advance_stage(Stage::MedicalHistory).is_err());
        s.advance_stage(Stage::VisitReason).unwrap();
        assert_eq!(s.stage(), Stage::VisitReason);
    }

    #[test]
    fn stage_can_jump_to_complete() {
        let mut s = session();
        s.advance_stage(Stage::Demographics).unwrap();
        s.advance_stage(Stage::Complete).unwrap();
        assert_eq!(s.stage(), Stage::Complete);
    }

    #[test]
    fn fail_sets_error_and_completed_at() {
        let mut s = session();
        s.fail("transport dropped").unwrap();
        assert_eq!(s.status(), SessionStatus::Failed);
        assert_eq!(s.error(), Some("transport dropped"));
        assert!(s.completed_at().is_some());
        assert_eq!(s.stage(), Stage::Complete);
    }

    #[test]
    fn complete_does_not_set_error() {
        let mut s = session();
        s.complete().unwrap();
        assert_eq!(s.status(), SessionStatus::Complete);
        assert!(s.error().is_none());
    }

    #[test]
    fn terminal_status_never_reverts() {
        let mut s = session();
        s.complete().unwrap();
        assert!(s.abandon().is_err());
        assert!(s.fail("late failure").is_err());
        assert_eq!(s.status(), SessionStatus::Complete);
        assert!(s.error().is_none());
    }

    #[test]
    fn finalize_data_installs_record_after_termination() {
        let mut s = session();
        s.abandon().unwrap();

        let mut record = IntakeRecord::default();
        record.demographics.full_name = FieldValue::Value("John Smith".into());
        record.extraction_failed = true;
        s.finalize_data(record.clone());

        assert_eq!(s.data(), &record);
    }
}
