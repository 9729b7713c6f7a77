//! Application state.

use reel_engine::{EngineConfig, ExportEngine};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub engine: ExportEngine,
}

impl AppState {
    /// State backed by the production engine.
    pub fn new(config: ApiConfig, engine_config: EngineConfig) -> Self {
        Self::with_engine(config, ExportEngine::from_config(engine_config))
    }

    pub fn with_engine(config: ApiConfig, engine: ExportEngine) -> Self {
        Self { config, engine }
    }
}
