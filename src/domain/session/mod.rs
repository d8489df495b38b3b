//! Session domain: the aggregate, its status machine, and errors.

mod aggregate;
mod errors;
mod status;

pub use aggregate::Session;
pub use errors::SessionError;
pub use status::SessionStatus;
