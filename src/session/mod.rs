//! Session lifecycle: the connection state machine and its reconnection policy

mod backoff;
mod machine;

pub use backoff::Backoff;
pub use machine::{Effect, SessionMachine};
