//! Language model adapters: Gemini and test mocks.

mod gemini;
mod mock;

pub use gemini::{GeminiAgent, GeminiExtractor};
pub use mock::{MockAgent, MockExtractor};
