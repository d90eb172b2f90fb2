use crate::config::BeaconConfig;
use crate::readiness::{EndpointReadinessTracker, ReadinessTracker};
use std::sync::Arc;

/// Shared state exposed to HTTP handlers and background workers.
#[derive(Clone)]
pub struct AppState {
    pub tracker: ReadinessTracker,
    pub endpoints: EndpointReadinessTracker,
    pub settings: Arc<BeaconConfig>,
}

impl AppState {
    pub fn new(
        tracker: ReadinessTracker,
        endpoints: EndpointReadinessTracker,
        settings: Arc<BeaconConfig>,
    ) -> Self {
        Self {
            tracker,
            endpoints,
            settings,
        }
    }
}
