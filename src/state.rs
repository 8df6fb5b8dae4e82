use std::sync::Arc;

use axum::extract::FromRef;

use crate::{config::Config, repositories::ExamStore, services::live::LiveHub};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ExamStore>,
    pub live: LiveHub,
    pub config: Config,
}

impl AppState {
    /// State with an in-process live hub.
    pub fn new(store: Arc<dyn ExamStore>, config: Config) -> Self {
        let live = LiveHub::new(config.live_channel_capacity);
        Self::with_live(store, live, config)
    }

    pub fn with_live(store: Arc<dyn ExamStore>, live: LiveHub, config: Config) -> Self {
        Self {
            store,
            live,
            config,
        }
    }
}

impl FromRef<AppState> for Arc<dyn ExamStore> {
    fn from_ref(state: &AppState) -> Self {
        state.store.clone()
    }
}

impl FromRef<AppState> for LiveHub {
    fn from_ref(state: &AppState) -> Self {
        state.live.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
