//! Session lifecycle: one background task per live session.
//!
//! The task joins the room, wires transport and transcript events into a
//! single channel, and drives the intake flow from that channel. Stopping is
//! cooperative (cancellation token) and idempotent, and every exit path runs
//! the final extraction reconciliation before the session goes terminal.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::IntakeConfig;
use crate::domain::foundation::{SessionId, ValidationError};
use crate::domain::intake::{ExtractedFields, FlowPolicy, IntakeFlow, IntakeRecord, Stage, Turn};
use crate::domain::session::{SessionError, SessionStatus};
use crate::ports::{
    AudioFrame, ConversationAgent, IntakeExtractor, PromptContext, RoomInfo, SpeechToText,
    TextToSpeech, Transport, TransportConnection, TransportEvent, TranscriptStream,
};

use super::extraction::ExtractionEngine;
use super::registry::{RunnerHandle, SessionRegistry};

/// Spoken when a patient turn could not be processed.
const FALLBACK_PHRASE: &str = "I didn't catch that, could you repeat?";

/// Turns of context handed to the prompt generator.
const PROMPT_CONTEXT_TURNS: usize = 10;

/// Everything that can wake the session task.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A final transcript of patient speech.
    PatientSpeech(String),
    ParticipantJoined,
    ParticipantLeft { reason: String },
    TransportError { message: String },
    /// A recoverable recognition failure (counted toward the failure cap).
    RecognitionFailure { message: String },
}

/// Lifecycle policy constants, derived from [`IntakeConfig`].
#[derive(Debug, Clone)]
pub struct LifecyclePolicy {
    pub max_consecutive_failures: u32,
    pub silence_timeout: Duration,
    /// Hard cap on one session's run, counted from the join. A patient who
    /// never shows up cannot hold a task open forever.
    pub max_session_duration: Duration,
    pub retry_backoff: Duration,
    pub flow: FlowPolicy,
}

impl LifecyclePolicy {
    pub fn from_config(config: &IntakeConfig) -> Self {
        Self {
            max_consecutive_failures: config.max_consecutive_failures,
            silence_timeout: Duration::from_secs(config.silence_timeout_secs),
            max_session_duration: Duration::from_secs(config.max_session_secs),
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            flow: FlowPolicy {
                max_reprompts: config.max_reprompts,
            },
        }
    }
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 3,
            silence_timeout: Duration::from_secs(20),
            max_session_duration: Duration::from_secs(600),
            retry_backoff: Duration::from_millis(500),
            flow: FlowPolicy::default(),
        }
    }
}

/// One agent reply in text-chat mode.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    pub reply: String,
    pub stage: Stage,
    pub is_complete: bool,
}

/// How a session run ended, before finalization.
#[derive(Debug, Clone, PartialEq)]
enum RunEnd {
    /// The flow reached its terminal stage.
    FlowFinished,
    /// The patient left or the connection closed.
    Walkaway,
    /// Stop was requested from outside.
    Cancelled,
    /// An unrecoverable error.
    Failed(String),
}

/// Terminal disposition applied during finalization.
#[derive(Debug, Clone, PartialEq)]
enum Disposition {
    Complete,
    Abandoned,
    Failed(String),
}

/// Drives sessions end to end: start, event loop, stop, finalization.
pub struct SessionLifecycleManager {
    registry: Arc<SessionRegistry>,
    transport: Arc<dyn Transport>,
    stt: Arc<dyn SpeechToText>,
    tts: Arc<dyn TextToSpeech>,
    agent: Arc<dyn ConversationAgent>,
    extractor: Arc<dyn IntakeExtractor>,
    engine: ExtractionEngine,
    policy: LifecyclePolicy,
}

impl SessionLifecycleManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<SessionRegistry>,
        transport: Arc<dyn Transport>,
        stt: Arc<dyn SpeechToText>,
        tts: Arc<dyn TextToSpeech>,
        agent: Arc<dyn ConversationAgent>,
        extractor: Arc<dyn IntakeExtractor>,
        policy: LifecyclePolicy,
    ) -> Self {
        let engine = ExtractionEngine::new(Arc::clone(&extractor));
        Self {
            registry,
            transport,
            stt,
            tts,
            agent,
            extractor,
            engine,
            policy,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Spawns the background task for a registered session.
    pub async fn start(self: &Arc<Self>, id: SessionId) -> Result<(), SessionError> {
        let room = self.registry.room_info(&id).await?;
        let cancel = CancellationToken::new();
        let manager = Arc::clone(self);
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            manager.run_session(id, room, task_cancel).await;
        });
        self.registry
            .install_runner(&id, RunnerHandle { cancel, task })
            .await?;
        info!(session_id = %id, "session task started");
        Ok(())
    }

    /// Stops a session: cancels the task, waits for it, and finalizes if the
    /// task did not get there first. Safe to call repeatedly.
    pub async fn stop(&self, id: SessionId) -> Result<SessionStatus, SessionError> {
        if let Some(runner) = self.registry.take_runner(&id).await? {
            runner.cancel.cancel();
            if runner.task.await.is_err() {
                warn!(session_id = %id, "session task panicked during stop");
            }
        }

        let session = self.registry.get(&id).await?;
        if session.is_terminal() {
            return Ok(session.status());
        }

        // Never started, or the task died before finalizing.
        let disposition = if session.data().confirmed {
            Disposition::Complete
        } else {
            Disposition::Abandoned
        };
        self.finalize(id, disposition).await?;
        Ok(self.registry.get(&id).await?.status())
    }

    /// Opening line for a text-chat session.
    ///
    /// Chat drives the same flow as voice, over HTTP instead of a room; the
    /// flow lives in the registry entry so its state survives between
    /// requests.
    pub async fn greeting(&self, id: SessionId) -> Result<ChatReply, SessionError> {
        let outcome = self
            .registry
            .update_with_chat_flow(&id, self.policy.flow.clone(), |flow, session| {
                if session.stage() != Stage::Greeting {
                    return Err(SessionError::invalid_stage_transition(
                        "greeting already delivered",
                    ));
                }
                let outcome = flow.greeting();
                session.record_turn(Turn::agent(&outcome.prompt, Stage::Greeting))?;
                session.advance_stage(outcome.stage)?;
                Ok(outcome)
            })
            .await??;
        Ok(ChatReply {
            reply: outcome.prompt,
            stage: outcome.stage,
            is_complete: false,
        })
    }

    /// Processes one text-chat message: extract, step the flow, persist,
    /// and phrase the reply.
    pub async fn chat(&self, id: SessionId, message: &str) -> Result<ChatReply, SessionError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ValidationError::empty_field("message").into());
        }

        let stage = self.registry.get(&id).await?.stage();
        let extracted = if stage == Stage::Greeting {
            // Nothing to extract before the first question is asked.
            ExtractedFields::default()
        } else {
            match retry_once(self.policy.retry_backoff, || {
                self.extractor.extract_stage_fields(message, stage)
            })
            .await
            {
                Ok(fields) => fields,
                Err(err) => {
                    warn!(session_id = %id, error = %err, "chat extraction failed");
                    self.registry
                        .update(&id, |session| {
                            session.record_turn(Turn::patient(message, stage))?;
                            session.record_turn(Turn::agent(FALLBACK_PHRASE, stage))
                        })
                        .await??;
                    return Ok(ChatReply {
                        reply: FALLBACK_PHRASE.to_string(),
                        stage,
                        is_complete: false,
                    });
                }
            }
        };

        let (outcome, collected, recent) = self
            .registry
            .update_with_chat_flow(&id, self.policy.flow.clone(), |flow, session| {
                session.record_turn(Turn::patient(message, stage))?;
                let mut data = session.data().clone();
                let outcome = flow.step(&mut data, message, &extracted);
                session.set_data(data)?;
                session.advance_stage(outcome.stage)?;
                let recent = recent_turns(session.history());
                Ok::<_, SessionError>((outcome, session.data().clone(), recent))
            })
            .await??;

        let reply = self
            .phrase_prompt(&outcome.prompt, outcome.stage, collected, recent, message)
            .await;
        self.registry
            .update(&id, |session| {
                let mut turn = Turn::agent(&reply, outcome.stage);
                if outcome.flagged {
                    turn = turn.flagged();
                }
                session.record_turn(turn)
            })
            .await??;

        if outcome.is_terminal {
            let confirmed = self.registry.get(&id).await?.data().confirmed;
            let disposition = if confirmed {
                Disposition::Complete
            } else {
                Disposition::Abandoned
            };
            self.finalize(id, disposition).await?;
        }

        Ok(ChatReply {
            reply,
            stage: outcome.stage,
            is_complete: outcome.is_terminal,
        })
    }

    async fn run_session(self: Arc<Self>, id: SessionId, room: RoomInfo, cancel: CancellationToken) {
        let end = match self.drive(id, &room, cancel).await {
            Ok(end) => end,
            Err(reason) => RunEnd::Failed(reason),
        };
        debug!(session_id = %id, end = ?end, "session run ended");

        let confirmed = match self.registry.get(&id).await {
            Ok(session) => session.data().confirmed,
            Err(_) => return, // deleted out from under us
        };
        let disposition = match end {
            RunEnd::Failed(reason) => Disposition::Failed(reason),
            RunEnd::FlowFinished | RunEnd::Walkaway | RunEnd::Cancelled => {
                if confirmed {
                    Disposition::Complete
                } else {
                    Disposition::Abandoned
                }
            }
        };
        if let Err(err) = self.finalize(id, disposition).await {
            warn!(session_id = %id, error = %err, "finalization skipped");
        }
    }

    /// The session event loop. Returns how the run ended; `Err` is an
    /// unrecoverable failure with its reason.
    async fn drive(
        &self,
        id: SessionId,
        room: &RoomInfo,
        cancel: CancellationToken,
    ) -> Result<RunEnd, String> {
        let mut conn = retry_once(self.policy.retry_backoff, || self.transport.join(room))
            .await
            .map_err(|e| format!("transport join failed: {e}"))?;

        let audio = conn
            .take_audio_input()
            .ok_or_else(|| "transport provided no audio input".to_string())?;
        // transcribe consumes the stream; a retry after the first call took
        // it runs against an empty stream and fails fast.
        let mut audio_slot = Some(audio);
        let transcripts = retry_once(self.policy.retry_backoff, || {
            self.stt.transcribe(take_stream(&mut audio_slot))
        })
        .await
        .map_err(|e| format!("transcription failed: {e}"))?;

        let (event_tx, mut event_rx) = mpsc::channel::<SessionEvent>(32);
        let (speak_tx, speak_rx) = mpsc::channel::<AudioFrame>(64);

        let transport_pump = tokio::spawn(pump_transport(
            conn,
            event_tx.clone(),
            speak_rx,
            cancel.clone(),
        ));
        let transcript_pump = tokio::spawn(pump_transcripts(
            transcripts,
            event_tx.clone(),
            cancel.clone(),
        ));
        drop(event_tx);

        let mut flow = IntakeFlow::new(self.policy.flow.clone());
        let mut consecutive_failures: u32 = 0;
        let deadline = tokio::time::Instant::now() + self.policy.max_session_duration;
        let end = loop {
            let wake = tokio::select! {
                _ = cancel.cancelled() => break RunEnd::Cancelled,
                _ = tokio::time::sleep_until(deadline) => {
                    info!(session_id = %id, "session hit its maximum duration");
                    break RunEnd::Walkaway;
                }
                event = event_rx.recv() => match event {
                    Some(event) => event,
                    None => break RunEnd::Walkaway,
                },
                _ = sleep(self.policy.silence_timeout) => {
                    match self.on_silence(id, &mut flow, &speak_tx).await {
                        Ok(true) => break RunEnd::FlowFinished,
                        Ok(false) => continue,
                        Err(err) => break RunEnd::Failed(err.to_string()),
                    }
                }
            };

            match wake {
                SessionEvent::ParticipantJoined => {
                    if let Err(err) = self.on_joined(id, &mut flow, &speak_tx).await {
                        break RunEnd::Failed(err.to_string());
                    }
                }
                SessionEvent::PatientSpeech(text) => {
                    match self
                        .on_patient_speech(id, &mut flow, &text, &speak_tx, &mut consecutive_failures)
                        .await
                    {
                        Ok(true) => break RunEnd::FlowFinished,
                        Ok(false) => {}
                        Err(StepError::Session(err)) => break RunEnd::Failed(err.to_string()),
                        Err(StepError::TooManyFailures) => {
                            break RunEnd::Failed(format!(
                                "{} consecutive recognition failures",
                                self.policy.max_consecutive_failures
                            ))
                        }
                    }
                }
                SessionEvent::ParticipantLeft { reason } => {
                    info!(session_id = %id, reason = %reason, "participant left");
                    break RunEnd::Walkaway;
                }
                SessionEvent::TransportError { message } => {
                    break RunEnd::Failed(format!("transport error: {message}"));
                }
                SessionEvent::RecognitionFailure { message } => {
                    consecutive_failures += 1;
                    warn!(
                        session_id = %id,
                        failures = consecutive_failures,
                        error = %message,
                        "recognition failure"
                    );
                    if consecutive_failures >= self.policy.max_consecutive_failures {
                        break RunEnd::Failed(format!(
                            "{} consecutive recognition failures",
                            self.policy.max_consecutive_failures
                        ));
                    }
                    self.speak(&speak_tx, FALLBACK_PHRASE).await;
                }
            }
        };

        cancel.cancel();
        let _ = transport_pump.await;
        let _ = transcript_pump.await;
        Ok(end)
    }

    /// Greets the patient once they are in the room.
    async fn on_joined(
        &self,
        id: SessionId,
        flow: &mut IntakeFlow,
        speak_tx: &mpsc::Sender<AudioFrame>,
    ) -> Result<(), SessionError> {
        let outcome = flow.greeting();
        self.registry
            .update(&id, |session| {
                session.record_turn(Turn::agent(&outcome.prompt, session.stage()))?;
                session.advance_stage(outcome.stage)
            })
            .await??;
        self.speak(speak_tx, &outcome.prompt).await;
        Ok(())
    }

    /// One patient turn: extract, step the flow, persist, prompt, speak.
    ///
    /// Returns true when the flow reached its terminal stage.
    async fn on_patient_speech(
        &self,
        id: SessionId,
        flow: &mut IntakeFlow,
        text: &str,
        speak_tx: &mpsc::Sender<AudioFrame>,
        consecutive_failures: &mut u32,
    ) -> Result<bool, StepError> {
        let stage = flow.stage();
        let extracted = match retry_once(self.policy.retry_backoff, || {
            self.extractor.extract_stage_fields(text, stage)
        })
        .await
        {
            Ok(fields) => fields,
            Err(err) => {
                *consecutive_failures += 1;
                warn!(
                    session_id = %id,
                    failures = *consecutive_failures,
                    error = %err,
                    "turn extraction failed"
                );
                if *consecutive_failures >= self.policy.max_consecutive_failures {
                    return Err(StepError::TooManyFailures);
                }
                // The stage does not move; ask the patient to try again.
                self.registry
                    .update(&id, |session| {
                        session.record_turn(Turn::patient(text, stage))?;
                        session.record_turn(Turn::agent(FALLBACK_PHRASE, stage))
                    })
                    .await??;
                self.speak(speak_tx, FALLBACK_PHRASE).await;
                return Ok(false);
            }
        };
        *consecutive_failures = 0;

        // The flow step and the session mutation happen under the per-id
        // lock, so readers never observe a half-applied turn.
        let (outcome, collected, recent) = self
            .registry
            .update(&id, |session| -> Result<_, SessionError> {
                session.record_turn(Turn::patient(text, stage))?;
                let mut data = session.data().clone();
                let outcome = flow.step(&mut data, text, &extracted);
                session.set_data(data)?;
                session.advance_stage(outcome.stage)?;
                let recent = recent_turns(session.history());
                Ok((outcome, session.data().clone(), recent))
            })
            .await??;

        let prompt = self
            .phrase_prompt(&outcome.prompt, outcome.stage, collected, recent, text)
            .await;
        self.registry
            .update(&id, |session| {
                let mut turn = Turn::agent(&prompt, outcome.stage);
                if outcome.flagged {
                    turn = turn.flagged();
                }
                session.record_turn(turn)
            })
            .await??;
        self.speak(speak_tx, &prompt).await;

        Ok(outcome.is_terminal)
    }

    /// Silence timeout tick. Returns true when the flow finished.
    async fn on_silence(
        &self,
        id: SessionId,
        flow: &mut IntakeFlow,
        speak_tx: &mpsc::Sender<AudioFrame>,
    ) -> Result<bool, SessionError> {
        // Nothing to nudge before the greeting has been spoken.
        if flow.stage() == Stage::Greeting {
            return Ok(false);
        }
        let outcome = self
            .registry
            .update(&id, |session| -> Result<_, SessionError> {
                let mut data = session.data().clone();
                let outcome = flow.handle_silence(&mut data);
                session.set_data(data)?;
                session.advance_stage(outcome.stage)?;
                let mut turn = Turn::agent(&outcome.prompt, outcome.stage);
                if outcome.flagged {
                    turn = turn.flagged();
                }
                session.record_turn(turn)?;
                Ok(outcome)
            })
            .await??;
        debug!(session_id = %id, stage = %outcome.stage, "silence re-prompt");
        self.speak(speak_tx, &outcome.prompt).await;
        Ok(outcome.is_terminal)
    }

    /// Asks the turn generator to phrase the scripted prompt naturally,
    /// falling back to the script itself.
    async fn phrase_prompt(
        &self,
        scripted: &str,
        stage: Stage,
        collected: IntakeRecord,
        recent_turns: Vec<Turn>,
        latest_utterance: &str,
    ) -> String {
        let context = PromptContext {
            stage,
            scripted_prompt: scripted.to_string(),
            collected,
            recent_turns,
            latest_utterance: latest_utterance.to_string(),
        };
        match retry_once(self.policy.retry_backoff, || self.agent.next_prompt(&context)).await {
            Ok(prompt) if !prompt.trim().is_empty() => prompt,
            Ok(_) => scripted.to_string(),
            Err(err) => {
                warn!(error = %err, "prompt generation failed, using scripted prompt");
                scripted.to_string()
            }
        }
    }

    /// Synthesizes and forwards agent speech. Synthesis failures are logged
    /// and swallowed; the turn is already in the history.
    async fn speak(&self, speak_tx: &mpsc::Sender<AudioFrame>, text: &str) {
        use futures::StreamExt;

        let mut audio = match retry_once(self.policy.retry_backoff, || self.tts.synthesize(text))
            .await
        {
            Ok(stream) => stream,
            Err(err) => {
                warn!(error = %err, "speech synthesis failed");
                return;
            }
        };
        while let Some(frame) = audio.next().await {
            if speak_tx.send(frame).await.is_err() {
                // Connection pump is gone.
                return;
            }
        }
    }

    /// Reconciles the final record and moves the session to its terminal
    /// status. A session that is already terminal is left untouched.
    async fn finalize(&self, id: SessionId, disposition: Disposition) -> Result<(), SessionError> {
        let session = self.registry.get(&id).await?;
        if session.is_terminal() {
            return Ok(());
        }

        let reconciled = self
            .engine
            .reconcile(session.history(), session.data())
            .await;
        if let Some(failure) = &reconciled.failure {
            warn!(session_id = %id, error = %failure, "session finalized with fallback record");
        }

        self.registry
            .update(&id, move |session| -> Result<(), SessionError> {
                if session.is_terminal() {
                    return Ok(());
                }
                session.finalize_data(reconciled.record);
                match disposition {
                    Disposition::Complete => session.complete(),
                    Disposition::Abandoned => session.abandon(),
                    Disposition::Failed(reason) => session.fail(reason),
                }
            })
            .await??;
        let status = self.registry.get(&id).await?.status();
        info!(session_id = %id, status = %status, "session finalized");
        Ok(())
    }
}

enum StepError {
    Session(SessionError),
    TooManyFailures,
}

impl From<SessionError> for StepError {
    fn from(err: SessionError) -> Self {
        StepError::Session(err)
    }
}

fn recent_turns(history: &[Turn]) -> Vec<Turn> {
    let start = history.len().saturating_sub(PROMPT_CONTEXT_TURNS);
    history[start..].to_vec()
}

// Streams are moved into transcribe; this keeps the retry closure FnMut-safe
// for the single call that actually consumes it.
fn take_stream(slot: &mut Option<crate::ports::AudioStream>) -> crate::ports::AudioStream {
    match slot.take() {
        Some(stream) => stream,
        None => Box::pin(futures::stream::empty()),
    }
}

/// Calls the operation, retrying exactly once after a backoff.
async fn retry_once<T, E, F, Fut>(backoff: Duration, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    match op().await {
        Ok(value) => Ok(value),
        Err(first) => {
            debug!(error = %first, "call failed, retrying once");
            sleep(backoff).await;
            op().await
        }
    }
}

/// Owns the transport connection: inbound events out, agent audio in.
async fn pump_transport(
    mut conn: Box<dyn TransportConnection>,
    events: mpsc::Sender<SessionEvent>,
    mut speech: mpsc::Receiver<AudioFrame>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = conn.next_event() => match event {
                Some(TransportEvent::ParticipantJoined { participant_id }) => {
                    debug!(participant_id = %participant_id, "participant joined");
                    if events.send(SessionEvent::ParticipantJoined).await.is_err() {
                        break;
                    }
                }
                Some(TransportEvent::ParticipantLeft { reason }) => {
                    let _ = events.send(SessionEvent::ParticipantLeft { reason }).await;
                    break;
                }
                Some(TransportEvent::Error { message }) => {
                    let _ = events.send(SessionEvent::TransportError { message }).await;
                    break;
                }
                None => {
                    let _ = events
                        .send(SessionEvent::ParticipantLeft {
                            reason: "connection closed".to_string(),
                        })
                        .await;
                    break;
                }
            },
            frame = speech.recv() => match frame {
                Some(frame) => {
                    if let Err(err) = conn.send_audio(frame).await {
                        let _ = events
                            .send(SessionEvent::TransportError {
                                message: err.to_string(),
                            })
                            .await;
                        break;
                    }
                }
                None => {
                    // Speaker side is gone; keep listening for events.
                    while let Some(event) = tokio::select! {
                        _ = cancel.cancelled() => None,
                        event = conn.next_event() => event,
                    } {
                        match event {
                            TransportEvent::ParticipantLeft { reason } => {
                                let _ =
                                    events.send(SessionEvent::ParticipantLeft { reason }).await;
                                break;
                            }
                            TransportEvent::Error { message } => {
                                let _ =
                                    events.send(SessionEvent::TransportError { message }).await;
                                break;
                            }
                            TransportEvent::ParticipantJoined { .. } => {
                                if events.send(SessionEvent::ParticipantJoined).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    break;
                }
            },
        }
    }
    if let Err(err) = conn.close().await {
        debug!(error = %err, "transport close reported an error");
    }
}

/// Forwards final transcripts as patient speech events.
async fn pump_transcripts(
    mut transcripts: TranscriptStream,
    events: mpsc::Sender<SessionEvent>,
    cancel: CancellationToken,
) {
    use futures::StreamExt;

    loop {
        let item = tokio::select! {
            _ = cancel.cancelled() => break,
            item = transcripts.next() => item,
        };
        match item {
            Some(Ok(event)) if event.is_final && !event.text.trim().is_empty() => {
                if events
                    .send(SessionEvent::PatientSpeech(event.text))
                    .await
                    .is_err()
                {
                    break;
                }
            }
            Some(Ok(_)) => {} // interim transcripts are not actionable
            Some(Err(err)) => {
                if events
                    .send(SessionEvent::RecognitionFailure {
                        message: err.to_string(),
                    })
                    .await
                    .is_err()
                {
                    break;
                }
            }
            None => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_from_config_converts_units() {
        let config = IntakeConfig {
            max_reprompts: 1,
            max_consecutive_failures: 5,
            silence_timeout_secs: 7,
            max_session_secs: 480,
            retry_backoff_ms: 250,
            session_max_age_secs: 3600,
            cleanup_interval_secs: 300,
        };
        let policy = LifecyclePolicy::from_config(&config);
        assert_eq!(policy.max_consecutive_failures, 5);
        assert_eq!(policy.silence_timeout, Duration::from_secs(7));
        assert_eq!(policy.max_session_duration, Duration::from_secs(480));
        assert_eq!(policy.retry_backoff, Duration::from_millis(250));
        assert_eq!(policy.flow.max_reprompts, 1);
    }

    #[tokio::test]
    async fn retry_once_recovers_on_second_attempt() {
        let attempts = std::sync::atomic::AtomicU32::new(0);
        let result: Result<u32, &str> = retry_once(Duration::from_millis(1), || {
            let n = attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err("first failure")
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result, Ok(42));
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn retry_once_gives_up_after_two_attempts() {
        let attempts = std::sync::atomic::AtomicU32::new(0);
        let result: Result<u32, &str> = retry_once(Duration::from_millis(1), || {
            attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async { Err("still down") }
        })
        .await;
        assert_eq!(result, Err("still down"));
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[test]
    fn recent_turns_is_a_bounded_window() {
        use crate::domain::intake::Stage;
        let history: Vec<Turn> = (0..25)
            .map(|i| Turn::patient(format!("turn {i}"), Stage::Demographics))
            .collect();
        let recent = recent_turns(&history);
        assert_eq!(recent.len(), PROMPT_CONTEXT_TURNS);
        assert_eq!(recent.last().map(|t| t.text.as_str()), Some("turn 24"));
    }
}
