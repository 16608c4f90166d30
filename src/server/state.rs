// src/server/state.rs

use std::sync::Arc;

use crate::config::ConfigFile;
use crate::hub::HubHandle;
use crate::job::JobRegistry;

/// Shared by every request handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<JobRegistry>,
    pub hub: HubHandle,
    pub config: Arc<ConfigFile>,
}

impl AppState {
    pub fn new(registry: Arc<JobRegistry>, hub: HubHandle, config: ConfigFile) -> Self {
        Self {
            registry,
            hub,
            config: Arc::new(config),
        }
    }
}
