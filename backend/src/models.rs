use crate::config::AppConfig;
use crate::lab::LabRegistry;
use std::sync::Arc;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub config: AppConfig,
    pub lab: Arc<LabRegistry>,
}

impl AppState {
    pub fn new(config: AppConfig, lab: Arc<LabRegistry>) -> SharedState {
        Arc::new(Self { config, lab })
    }
}
