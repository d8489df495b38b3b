//! Application layer: orchestration over the domain and the ports.

pub mod extraction;
pub mod lifecycle;
pub mod registry;

pub use extraction::{ExtractionEngine, ReconciledRecord};
pub use lifecycle::{ChatReply, LifecyclePolicy, SessionEvent, SessionLifecycleManager};
pub use registry::{RunnerHandle, SessionRegistry};
