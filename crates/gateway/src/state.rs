use crate::config::Settings;
use crate::store::SessionStore;
use inference::Detector;
use std::sync::Arc;
use tokio::sync::Semaphore;

#[derive(Clone)]
pub struct AppState {
    pub detector: Arc<dyn Detector>,
    pub sessions: SessionStore,
    pub settings: Arc<Settings>,
    /// One forward pass at a time. Requests wait here asynchronously so a
    /// request that times out in the queue never occupies a blocking worker.
    pub detector_slot: Arc<Semaphore>,
}

impl AppState {
    pub fn new(detector: Arc<dyn Detector>, settings: Settings) -> Self {
        Self {
            detector,
            sessions: SessionStore::new(settings.max_sessions),
            settings: Arc::new(settings),
            detector_slot: Arc::new(Semaphore::new(1)),
        }
    }
}
