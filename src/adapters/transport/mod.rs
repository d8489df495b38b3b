//! Transport adapters: Daily rooms, the media gateway, and test mocks.

mod daily;
mod mock;

pub use daily::{DailyRoomService, GatewayTransport, GATEWAY_SAMPLE_RATE};
pub use mock::{MockRoomService, MockTransport};
