//! HTTP API of the prompt composer

mod handlers;
mod types;

pub use handlers::create_router;
pub use types::*;

use crate::llm::CompletionService;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Upstream service; `None` when no API key is configured
    pub completion: Option<Arc<dyn CompletionService>>,
}

impl AppState {
    #[must_use]
    pub fn new(completion: Option<Arc<dyn CompletionService>>) -> Self {
        Self { completion }
    }
}
