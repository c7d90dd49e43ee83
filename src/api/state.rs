use std::sync::Arc;

use crate::detect::engine::ScoringMonitor;

#[derive(Clone)]
pub struct AppState {
    pub monitor: Arc<ScoringMonitor>,
}

impl AppState {
    pub fn new(monitor: Arc<ScoringMonitor>) -> Self {
        Self { monitor }
    }
}
