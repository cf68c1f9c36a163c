//! Runtime for executing a script-chat session
//!
//! Carries out the effects produced by the state machine: opening and
//! cancelling streams, feeding decoded fragments back in, and notifying the user.

mod executor;
pub mod traits;
mod transport;

#[cfg(test)]
pub mod testing;

pub use executor::{ChatEvent, ScriptChat, TurnOutcome};
pub use traits::*;
pub use transport::{HttpTransport, TransportConfig};

/// Session talking to a real composer over HTTP
pub type HttpScriptChat = ScriptChat<HttpTransport>;
