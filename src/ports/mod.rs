//! Ports: abstract contracts for the external collaborators the core
//! depends on. Adapters implement these; the application layer consumes
//! them.

mod conversation_agent;
mod intake_extractor;
mod speech;
mod transport;

pub use conversation_agent::{AiError, ConversationAgent, PromptContext};
pub use intake_extractor::IntakeExtractor;
pub use speech::{
    SpeechError, SpeechToText, TextToSpeech, TranscriptEvent, TranscriptStream, VadEvent,
    VoiceActivityDetector,
};
pub use transport::{
    AudioFrame, AudioStream, RoomInfo, RoomService, Transport, TransportConnection,
    TransportError, TransportEvent,
};
