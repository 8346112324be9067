use crate::config::settings::AppConfig;
use crate::infrastructure::storage::BlobStore;
use crate::modules::transcode::service::{Dispatcher, StatusResolver};
use crate::modules::transcode::store::TaskStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn TaskStore>,
    pub storage: Arc<dyn BlobStore>,
    pub dispatcher: Arc<Dispatcher>,
    pub resolver: Arc<StatusResolver>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn TaskStore>,
        storage: Arc<dyn BlobStore>,
        dispatcher: Arc<Dispatcher>,
        resolver: Arc<StatusResolver>,
    ) -> Self {
        Self {
            config,
            store,
            storage,
            dispatcher,
            resolver,
        }
    }
}
