//! Speech adapters: Deepgram STT/TTS, energy VAD, and test mocks.

mod deepgram;
mod energy_vad;
mod mock;

pub use deepgram::{DeepgramStt, DeepgramTts};
pub use energy_vad::{EnergyVad, EnergyVadConfig};
pub use mock::{MockStt, MockTts, MockVad};
