//! Script Chat - sales-call script rehearsal
//!
//! A prompt composer that relays role-play completions as server-sent events,
//! and a conversation orchestrator that drives one rehearsal session against it.

pub mod api;
pub mod llm;
pub mod runtime;
pub mod state_machine;
pub mod stream_decoder;
pub mod system_prompt;
