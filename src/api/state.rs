use std::sync::Arc;

use crate::config::Config;
use crate::fetcher::MediaFetcher;
use crate::observability::Metrics;
use crate::store::TaskStore;

/// Shared application state passed to every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<TaskStore>,
    pub fetcher: Arc<dyn MediaFetcher>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(config: Config, store: TaskStore, fetcher: Arc<dyn MediaFetcher>) -> Self {
        Self {
            config: Arc::new(config),
            store: Arc::new(store),
            fetcher,
            metrics: Arc::new(Metrics::new()),
        }
    }
}
