//! Adapters - Concrete implementations of the ports.

pub mod ai;
pub mod http;
pub mod speech;
pub mod transport;
