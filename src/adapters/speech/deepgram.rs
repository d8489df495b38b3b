//! Deepgram speech adapters.
//!
//! STT segments the inbound audio with the energy VAD and sends each
//! complete utterance to the prerecorded listen endpoint; TTS streams raw
//! PCM back from the speak endpoint. Both use the plain REST API, so the
//! only long-lived connection in the pipeline is the room transport itself.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::VoiceConfig;
use crate::ports::{
    AudioFrame, AudioStream, SpeechError, SpeechToText, TextToSpeech, TranscriptEvent,
    TranscriptStream, VadEvent, VoiceActivityDetector,
};

use super::energy_vad::{EnergyVad, EnergyVadConfig};

/// Synthesized audio sample rate.
const TTS_SAMPLE_RATE: u32 = 16_000;

/// Samples per synthesized frame (20ms at 16 kHz).
const TTS_FRAME_SAMPLES: usize = 320;

/// Request timeout for both endpoints, in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Speech-to-text against the Deepgram listen endpoint.
#[derive(Clone)]
pub struct DeepgramStt {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    vad_config: EnergyVadConfig,
}

impl DeepgramStt {
    pub fn new(config: &VoiceConfig) -> Result<Self, SpeechError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| SpeechError::network(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: config.deepgram_key().to_string(),
            base_url: config.deepgram_base_url.clone(),
            model: config.stt_model.clone(),
            vad_config: EnergyVadConfig::default(),
        })
    }

    /// Overrides the VAD tuning.
    pub fn with_vad_config(mut self, vad_config: EnergyVadConfig) -> Self {
        self.vad_config = vad_config;
        self
    }

    async fn transcribe_utterance(
        &self,
        samples: &[i16],
        sample_rate: u32,
    ) -> Result<Option<String>, SpeechError> {
        let mut body = Vec::with_capacity(samples.len() * 2);
        for sample in samples {
            body.extend_from_slice(&sample.to_le_bytes());
        }

        let response = self
            .client
            .post(format!("{}/v1/listen", self.base_url))
            .query(&[
                ("model", self.model.as_str()),
                ("encoding", "linear16"),
                ("language", "en"),
                ("smart_format", "true"),
            ])
            .query(&[("sample_rate", sample_rate)])
            .header("Authorization", format!("Token {}", self.api_key))
            .header("Content-Type", "application/octet-stream")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SpeechError::Timeout { timeout_secs: REQUEST_TIMEOUT_SECS as u32 }
                } else {
                    SpeechError::network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SpeechError::api(status.as_u16(), text));
        }

        let parsed: ListenResponse = response
            .json()
            .await
            .map_err(|e| SpeechError::Decode(format!("malformed listen response: {e}")))?;
        let transcript = parsed
            .results
            .channels
            .into_iter()
            .next()
            .and_then(|c| c.alternatives.into_iter().next())
            .map(|a| a.transcript)
            .unwrap_or_default();
        if transcript.trim().is_empty() {
            Ok(None)
        } else {
            Ok(Some(transcript))
        }
    }
}

#[async_trait]
impl SpeechToText for DeepgramStt {
    async fn transcribe(&self, mut audio: AudioStream) -> Result<TranscriptStream, SpeechError> {
        let (mut tx, rx) = futures::channel::mpsc::channel(16);
        let stt = self.clone();

        tokio::spawn(async move {
            let vad_config = stt.vad_config.clone();
            let mut vad = EnergyVad::new(vad_config.clone());
            // Pre-roll keeps the onset frames the VAD needed to trigger.
            let mut preroll: Vec<AudioFrame> = Vec::new();
            let mut utterance: Vec<i16> = Vec::new();
            let mut sample_rate = TTS_SAMPLE_RATE;

            while let Some(frame) = audio.next().await {
                sample_rate = frame.sample_rate;
                match vad.process(&frame) {
                    Some(VadEvent::SpeechStart) => {
                        for early in preroll.drain(..) {
                            utterance.extend_from_slice(&early.samples);
                        }
                        utterance.extend_from_slice(&frame.samples);
                    }
                    Some(VadEvent::SpeechEnd) => {
                        utterance.extend_from_slice(&frame.samples);
                        let samples = std::mem::take(&mut utterance);
                        if !deliver(&stt, &mut tx, &samples, sample_rate).await {
                            return;
                        }
                    }
                    None => {
                        if vad.in_speech() {
                            utterance.extend_from_slice(&frame.samples);
                        } else {
                            preroll.push(frame);
                            let cap = vad_config.min_speech_frames as usize;
                            if preroll.len() > cap {
                                preroll.remove(0);
                            }
                        }
                    }
                }
            }
            // Connection ended mid-utterance: flush what was captured.
            if !utterance.is_empty() {
                let _ = deliver(&stt, &mut tx, &utterance, sample_rate).await;
            }
        });

        Ok(Box::pin(rx))
    }
}

/// Transcribes one utterance and forwards the result. Returns false when
/// the consumer has gone away.
async fn deliver(
    stt: &DeepgramStt,
    tx: &mut futures::channel::mpsc::Sender<Result<TranscriptEvent, SpeechError>>,
    samples: &[i16],
    sample_rate: u32,
) -> bool {
    let item = match stt.transcribe_utterance(samples, sample_rate).await {
        Ok(Some(text)) => {
            debug!(chars = text.len(), "utterance transcribed");
            Ok(TranscriptEvent::final_text(text))
        }
        Ok(None) => return true, // silence misclassified as speech
        Err(err) => Err(err),
    };
    tx.send(item).await.is_ok()
}

/// Text-to-speech against the Deepgram speak endpoint.
pub struct DeepgramTts {
    client: Client,
    api_key: String,
    base_url: String,
    voice: String,
}

impl DeepgramTts {
    pub fn new(config: &VoiceConfig) -> Result<Self, SpeechError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| SpeechError::network(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: config.deepgram_key().to_string(),
            base_url: config.deepgram_base_url.clone(),
            voice: config.tts_voice.clone(),
        })
    }
}

#[async_trait]
impl TextToSpeech for DeepgramTts {
    async fn synthesize(&self, text: &str) -> Result<AudioStream, SpeechError> {
        let response = self
            .client
            .post(format!("{}/v1/speak", self.base_url))
            .query(&[
                ("model", self.voice.as_str()),
                ("encoding", "linear16"),
                ("container", "none"),
            ])
            .query(&[("sample_rate", TTS_SAMPLE_RATE)])
            .header("Authorization", format!("Token {}", self.api_key))
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SpeechError::Timeout { timeout_secs: REQUEST_TIMEOUT_SECS as u32 }
                } else {
                    SpeechError::network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SpeechError::api(status.as_u16(), text));
        }

        let (mut tx, rx) = futures::channel::mpsc::channel::<AudioFrame>(64);
        tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            let mut pending: Vec<u8> = Vec::new();
            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(err) => {
                        warn!(error = %err, "synthesis stream interrupted");
                        break;
                    }
                };
                pending.extend_from_slice(&chunk);
                while pending.len() >= TTS_FRAME_SAMPLES * 2 {
                    let frame_bytes: Vec<u8> =
                        pending.drain(..TTS_FRAME_SAMPLES * 2).collect();
                    let samples = frame_bytes
                        .chunks_exact(2)
                        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
                        .collect();
                    if tx
                        .send(AudioFrame::new(samples, TTS_SAMPLE_RATE))
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
            }
            // Trailing partial frame.
            if pending.len() >= 2 {
                let samples = pending
                    .chunks_exact(2)
                    .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
                    .collect();
                let _ = tx.send(AudioFrame::new(samples, TTS_SAMPLE_RATE)).await;
            }
        });

        Ok(Box::pin(rx))
    }
}

// --- Wire format ---

#[derive(Debug, Deserialize)]
struct ListenResponse {
    results: ListenResults,
}

#[derive(Debug, Deserialize)]
struct ListenResults {
    #[serde(default)]
    channels: Vec<ListenChannel>,
}

#[derive(Debug, Deserialize)]
struct ListenChannel {
    #[serde(default)]
    alternatives: Vec<ListenAlternative>,
}

#[derive(Debug, Deserialize)]
struct ListenAlternative {
    #[serde(default)]
    transcript: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listen_response_takes_first_alternative() {
        let parsed: ListenResponse = serde_json::from_str(
            r#"{"results": {"channels": [{"alternatives": [
                {"transcript": "my name is John Smith"},
                {"transcript": "my name is Jon Smith"}
            ]}]}}"#,
        )
        .unwrap();
        let transcript = parsed
            .results
            .channels
            .into_iter()
            .next()
            .and_then(|c| c.alternatives.into_iter().next())
            .map(|a| a.transcript);
        assert_eq!(transcript.as_deref(), Some("my name is John Smith"));
    }

    #[test]
    fn listen_response_tolerates_empty_results() {
        let parsed: ListenResponse =
            serde_json::from_str(r#"{"results": {"channels": []}}"#).unwrap();
        assert!(parsed.results.channels.is_empty());
    }
}
