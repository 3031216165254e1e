//! Application state injected into HTTP handlers via axum's `State`
//! extractor (§6).

use std::sync::Arc;

use rag_config::Settings;
use rag_pipeline::Pipeline;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(pipeline: Pipeline, settings: Settings) -> Self {
        Self { pipeline: Arc::new(pipeline), settings: Arc::new(settings) }
    }
}
