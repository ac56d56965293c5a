use std::sync::Arc;

use crate::assessment::Pipeline;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Assessment pipeline with its LLM, store, renderer and optional cache.
    pub pipeline: Arc<Pipeline>,
}
