use fts_chinese::config::AppConfig;
use fts_chinese::SearchEngine;

/// Shared handler state / 共享状态
pub struct AppState {
    pub engine: SearchEngine,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(engine: SearchEngine, config: AppConfig) -> Self {
        Self { engine, config }
    }
}
