use std::sync::Arc;

use crate::config::EngineConfig;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Debug, Default)]
pub struct AppState {
    /// Validated once on load, then shared read-only by every computation.
    pub config: Option<Arc<EngineConfig>>,
}
