//! Domain layer: pure intake and session logic, no I/O.

pub mod foundation;
pub mod intake;
pub mod session;
