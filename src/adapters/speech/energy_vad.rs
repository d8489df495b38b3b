//! Energy-based voice activity detection.
//!
//! Frames whose RMS energy crosses a threshold count toward speech onset;
//! a hangover window of quiet frames must pass before speech is considered
//! ended, so natural mid-sentence pauses do not split an utterance.

use crate::ports::{AudioFrame, VadEvent, VoiceActivityDetector};

/// RMS threshold and frame counts for speech boundaries.
#[derive(Debug, Clone)]
pub struct EnergyVadConfig {
    /// Minimum RMS for a frame to count as speech.
    pub threshold: f32,
    /// Consecutive speech frames required to open an utterance.
    pub min_speech_frames: u32,
    /// Consecutive quiet frames required to close an utterance.
    pub hangover_frames: u32,
}

impl Default for EnergyVadConfig {
    fn default() -> Self {
        Self {
            threshold: 500.0,
            min_speech_frames: 3,
            // ~500ms at 20ms frames.
            hangover_frames: 25,
        }
    }
}

/// Stateful RMS-threshold detector.
#[derive(Debug, Clone)]
pub struct EnergyVad {
    config: EnergyVadConfig,
    in_speech: bool,
    speech_run: u32,
    quiet_run: u32,
}

impl EnergyVad {
    pub fn new(config: EnergyVadConfig) -> Self {
        Self {
            config,
            in_speech: false,
            speech_run: 0,
            quiet_run: 0,
        }
    }

    /// True between a `SpeechStart` and the matching `SpeechEnd`.
    pub fn in_speech(&self) -> bool {
        self.in_speech
    }
}

impl Default for EnergyVad {
    fn default() -> Self {
        Self::new(EnergyVadConfig::default())
    }
}

impl VoiceActivityDetector for EnergyVad {
    fn process(&mut self, frame: &AudioFrame) -> Option<VadEvent> {
        let loud = frame.rms() >= self.config.threshold;

        if self.in_speech {
            if loud {
                self.quiet_run = 0;
            } else {
                self.quiet_run += 1;
                if self.quiet_run >= self.config.hangover_frames {
                    self.in_speech = false;
                    self.quiet_run = 0;
                    self.speech_run = 0;
                    return Some(VadEvent::SpeechEnd);
                }
            }
        } else if loud {
            self.speech_run += 1;
            if self.speech_run >= self.config.min_speech_frames {
                self.in_speech = true;
                self.quiet_run = 0;
                return Some(VadEvent::SpeechStart);
            }
        } else {
            self.speech_run = 0;
        }
        None
    }

    fn reset(&mut self) {
        self.in_speech = false;
        self.speech_run = 0;
        self.quiet_run = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loud_frame() -> AudioFrame {
        AudioFrame::new(vec![8000; 320], 16_000)
    }

    fn quiet_frame() -> AudioFrame {
        AudioFrame::new(vec![10; 320], 16_000)
    }

    fn vad() -> EnergyVad {
        EnergyVad::new(EnergyVadConfig {
            threshold: 500.0,
            min_speech_frames: 2,
            hangover_frames: 3,
        })
    }

    #[test]
    fn speech_starts_after_min_frames() {
        let mut vad = vad();
        assert_eq!(vad.process(&loud_frame()), None);
        assert_eq!(vad.process(&loud_frame()), Some(VadEvent::SpeechStart));
        assert!(vad.in_speech());
    }

    #[test]
    fn isolated_loud_frame_is_not_speech() {
        let mut vad = vad();
        assert_eq!(vad.process(&loud_frame()), None);
        assert_eq!(vad.process(&quiet_frame()), None);
        assert_eq!(vad.process(&loud_frame()), None);
        assert!(!vad.in_speech());
    }

    #[test]
    fn speech_ends_only_after_hangover() {
        let mut vad = vad();
        vad.process(&loud_frame());
        vad.process(&loud_frame());

        assert_eq!(vad.process(&quiet_frame()), None);
        assert_eq!(vad.process(&quiet_frame()), None);
        assert_eq!(vad.process(&quiet_frame()), Some(VadEvent::SpeechEnd));
        assert!(!vad.in_speech());
    }

    #[test]
    fn pause_shorter_than_hangover_does_not_split() {
        let mut vad = vad();
        vad.process(&loud_frame());
        vad.process(&loud_frame());

        vad.process(&quiet_frame());
        vad.process(&quiet_frame());
        assert_eq!(vad.process(&loud_frame()), None);
        assert!(vad.in_speech());
    }

    #[test]
    fn reset_clears_state() {
        let mut vad = vad();
        vad.process(&loud_frame());
        vad.process(&loud_frame());
        vad.reset();
        assert!(!vad.in_speech());
        assert_eq!(vad.process(&loud_frame()), None);
    }
}
