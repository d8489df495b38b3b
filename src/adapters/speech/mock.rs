//! Mock speech adapters: scripted transcripts, captured synthesis.

use async_trait::async_trait;
use futures::SinkExt;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::ports::{
    AudioFrame, AudioStream, SpeechError, SpeechToText, TextToSpeech, TranscriptEvent,
    TranscriptStream, VadEvent, VoiceActivityDetector,
};

/// Speech-to-text that replays a script instead of listening.
///
/// Items are emitted in order with an optional delay between them, which
/// keeps event ordering deterministic when tests mix transcripts with
/// transport events.
#[derive(Clone, Default)]
pub struct MockStt {
    script: Arc<Mutex<VecDeque<Result<TranscriptEvent, SpeechError>>>>,
    delay: Option<Duration>,
}

impl MockStt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a final transcript.
    pub fn with_utterance(self, text: impl Into<String>) -> Self {
        self.push(Ok(TranscriptEvent::final_text(text)));
        self
    }

    /// Queues an interim transcript (should be ignored downstream).
    pub fn with_interim(self, text: impl Into<String>) -> Self {
        self.push(Ok(TranscriptEvent::interim(text)));
        self
    }

    /// Queues a recognition error.
    pub fn with_error(self, error: SpeechError) -> Self {
        self.push(Err(error));
        self
    }

    /// Spaces emissions apart.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn push(&self, item: Result<TranscriptEvent, SpeechError>) {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(item);
    }
}

#[async_trait]
impl SpeechToText for MockStt {
    async fn transcribe(&self, _audio: AudioStream) -> Result<TranscriptStream, SpeechError> {
        let items: Vec<_> = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        let delay = self.delay;
        let (mut tx, rx) = futures::channel::mpsc::channel(16);
        tokio::spawn(async move {
            for item in items {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                if tx.send(item).await.is_err() {
                    return;
                }
            }
        });
        Ok(Box::pin(rx))
    }
}

/// Text-to-speech that records what was spoken.
#[derive(Clone, Default)]
pub struct MockTts {
    spoken: Arc<Mutex<Vec<String>>>,
    fail: Arc<Mutex<bool>>,
}

impl MockTts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes synthesis fail.
    pub fn failing() -> Self {
        let tts = Self::new();
        *tts.fail.lock().unwrap_or_else(|e| e.into_inner()) = true;
        tts
    }

    /// Texts synthesized so far, in order.
    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl TextToSpeech for MockTts {
    async fn synthesize(&self, text: &str) -> Result<AudioStream, SpeechError> {
        if *self.fail.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(SpeechError::network("mock synthesis outage"));
        }
        self.spoken
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(text.to_string());
        // One token frame per utterance is enough for pipeline tests.
        let frame = AudioFrame::new(vec![0; 320], 16_000);
        Ok(Box::pin(futures::stream::iter(vec![frame])))
    }
}

/// Detector that replays scripted boundary events.
#[derive(Debug, Default)]
pub struct MockVad {
    events: VecDeque<Option<VadEvent>>,
}

impl MockVad {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the result of the next `process` call.
    pub fn with_event(mut self, event: Option<VadEvent>) -> Self {
        self.events.push_back(event);
        self
    }
}

impl VoiceActivityDetector for MockVad {
    fn process(&mut self, _frame: &AudioFrame) -> Option<VadEvent> {
        self.events.pop_front().flatten()
    }

    fn reset(&mut self) {
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn stt_replays_script_in_order() {
        let stt = MockStt::new()
            .with_interim("my name")
            .with_utterance("my name is John Smith")
            .with_error(SpeechError::network("blip"));
        let stream = stt
            .transcribe(Box::pin(futures::stream::empty()))
            .await
            .unwrap();
        let items: Vec<_> = stream.collect().await;

        assert_eq!(items.len(), 3);
        assert!(!items[0].as_ref().unwrap().is_final);
        assert_eq!(items[1].as_ref().unwrap().text, "my name is John Smith");
        assert!(items[2].is_err());
    }

    #[tokio::test]
    async fn tts_records_spoken_text() {
        let tts = MockTts::new();
        let audio = tts.synthesize("Hello there").await.unwrap();
        let frames: Vec<_> = audio.collect().await;

        assert_eq!(frames.len(), 1);
        assert_eq!(tts.spoken(), vec!["Hello there".to_string()]);
    }

    #[tokio::test]
    async fn failing_tts_returns_error() {
        let tts = MockTts::failing();
        assert!(tts.synthesize("anything").await.is_err());
        assert!(tts.spoken().is_empty());
    }

    #[test]
    fn vad_replays_events() {
        let mut vad = MockVad::new()
            .with_event(None)
            .with_event(Some(VadEvent::SpeechStart));
        let frame = AudioFrame::new(vec![0; 160], 16_000);
        assert_eq!(vad.process(&frame), None);
        assert_eq!(vad.process(&frame), Some(VadEvent::SpeechStart));
        assert_eq!(vad.process(&frame), None);
    }
}
