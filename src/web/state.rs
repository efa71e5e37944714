use std::sync::Arc;

use crate::deps::AppDeps;

/// Shared application state for the web server.
pub struct AppState {
    pub deps: Arc<AppDeps>,
    pub startup_time: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(deps: Arc<AppDeps>) -> Self {
        Self {
            deps,
            startup_time: chrono::Utc::now(),
        }
    }
}
