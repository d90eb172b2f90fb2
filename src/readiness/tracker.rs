use crate::error::{Error, Result};
use crate::readiness::component::{ComponentReadiness, SystemReadiness};
use crate::readiness::state::{ComponentType, ReadinessResult, ReadinessState};
use crate::state_transition;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::time::Instant;

const DEFAULT_EVENT_BUFFER: usize = 64;

/// Change notification published after every accepted state report.
///
/// By the time a subscriber observes the event, the registry already reflects
/// `current_state` (update-then-notify ordering).
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessEvent {
    pub component_id: String,
    pub previous_state: ReadinessState,
    pub current_state: ReadinessState,
    pub result: ReadinessResult,
    pub timestamp: DateTime<Utc>,
}

/// Process-wide registry of component readiness. Cheap to clone; all clones
/// share one registry and one event stream.
#[derive(Clone)]
pub struct ReadinessTracker {
    inner: Arc<TrackerInner>,
}

struct TrackerInner {
    components: RwLock<BTreeMap<String, ComponentReadiness>>,
    events: broadcast::Sender<ReadinessEvent>,
}

impl Default for ReadinessTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessTracker {
    pub fn new() -> Self {
        Self::with_event_buffer(DEFAULT_EVENT_BUFFER)
    }

    pub fn with_event_buffer(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(TrackerInner {
                components: RwLock::new(BTreeMap::new()),
                events,
            }),
        }
    }

    /// Subscribe to the change stream. Slow subscribers may observe
    /// `Lagged` and should fall back to a registry read.
    pub fn subscribe(&self) -> broadcast::Receiver<ReadinessEvent> {
        self.inner.events.subscribe()
    }

    /// Create the record if absent, starting in `NotStarted`. Re-registering
    /// an existing id is a no-op and preserves live state.
    pub async fn register_component(
        &self,
        component_id: &str,
        component_type: ComponentType,
        dependencies: Vec<String>,
    ) {
        let mut guard = self.inner.components.write().await;
        if guard.contains_key(component_id) {
            tracing::debug!(
                component = component_id,
                "duplicate registration ignored; existing state preserved"
            );
            return;
        }

        guard.insert(
            component_id.to_string(),
            ComponentReadiness::register(component_id, component_type, dependencies),
        );
        drop(guard);

        tracing::info!(
            component = component_id,
            component_type = component_type.as_str(),
            "component registered"
        );
    }

    /// Record a state report. Fails with `UnknownComponent` for ids never
    /// registered; otherwise replaces state/result/timestamp atomically and
    /// then notifies subscribers.
    pub async fn update_readiness(&self, component_id: &str, result: ReadinessResult) -> Result<()> {
        let event = {
            let mut guard = self.inner.components.write().await;
            let record = guard
                .get_mut(component_id)
                .ok_or_else(|| Error::unknown_component(component_id))?;

            let previous_state = record.state;
            record.apply(result.clone());

            ReadinessEvent {
                component_id: component_id.to_string(),
                previous_state,
                current_state: record.state,
                result,
                timestamp: record.last_updated,
            }
        };

        if event.previous_state != event.current_state {
            state_transition!(
                info,
                component = component_id,
                from = event.previous_state.as_str(),
                to = event.current_state.as_str(),
                message = event.result.message,
            );
        }

        // Send after the write lock is released; a send error only means no
        // subscriber is currently listening.
        let _ = self.inner.events.send(event);
        Ok(())
    }

    pub async fn get_component_readiness(&self, component_id: &str) -> Option<ComponentReadiness> {
        let guard = self.inner.components.read().await;
        guard.get(component_id).cloned()
    }

    /// Aggregate verdict computed from a consistent snapshot taken under the
    /// read lock, so counts always sum to `total_components`.
    pub async fn system_readiness(&self) -> SystemReadiness {
        let snapshot: Vec<ComponentReadiness> = {
            let guard = self.inner.components.read().await;
            guard.values().cloned().collect()
        };
        SystemReadiness::from_components(snapshot)
    }

    pub async fn components_of_type(&self, component_type: ComponentType) -> Vec<ComponentReadiness> {
        let guard = self.inner.components.read().await;
        guard
            .values()
            .filter(|record| record.component_type == component_type)
            .cloned()
            .collect()
    }

    /// Suspend until `component_id` reports `Ready`, or fail with
    /// `WaitTimeout` naming the component once `timeout` elapses.
    pub async fn wait_for_component(
        &self,
        component_id: &str,
        timeout: Duration,
    ) -> Result<ReadinessResult> {
        let deadline = Instant::now() + timeout;
        // Subscribe before the first state check so an update racing with
        // subscription setup cannot be missed.
        let mut receiver = self.subscribe();

        if let Some(record) = self.get_component_readiness(component_id).await {
            if record.state.is_ready() {
                return Ok(record.last_result);
            }
        }

        loop {
            match tokio::time::timeout_at(deadline, receiver.recv()).await {
                Err(_) => return Err(Error::wait_timeout(component_id, timeout)),
                Ok(Ok(event)) => {
                    if event.component_id == component_id && event.current_state.is_ready() {
                        return Ok(event.result);
                    }
                }
                Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                    tracing::warn!(
                        component = component_id,
                        skipped,
                        "wait subscriber lagged; re-reading registry"
                    );
                    if let Some(record) = self.get_component_readiness(component_id).await {
                        if record.state.is_ready() {
                            return Ok(record.last_result);
                        }
                    }
                }
                Ok(Err(broadcast::error::RecvError::Closed)) => {
                    // The tracker owns the sender, so this only happens during
                    // teardown; wait out the deadline and report the timeout.
                    tokio::time::sleep_until(deadline).await;
                    return Err(Error::wait_timeout(component_id, timeout));
                }
            }
        }
    }

    /// Suspend until every registered component is `Ready`, or fail with
    /// `WaitTimeout` for "system" once `timeout` elapses.
    pub async fn wait_for_system_ready(&self, timeout: Duration) -> Result<SystemReadiness> {
        let deadline = Instant::now() + timeout;
        let mut receiver = self.subscribe();

        let snapshot = self.system_readiness().await;
        if snapshot.is_fully_ready {
            return Ok(snapshot);
        }

        loop {
            match tokio::time::timeout_at(deadline, receiver.recv()).await {
                Err(_) => return Err(Error::wait_timeout("system", timeout)),
                Ok(Ok(_)) | Ok(Err(broadcast::error::RecvError::Lagged(_))) => {
                    let snapshot = self.system_readiness().await;
                    if snapshot.is_fully_ready {
                        return Ok(snapshot);
                    }
                }
                Ok(Err(broadcast::error::RecvError::Closed)) => {
                    tokio::time::sleep_until(deadline).await;
                    return Err(Error::wait_timeout("system", timeout));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn registration_is_idempotent_and_preserves_state() {
        let tracker = ReadinessTracker::new();
        tracker
            .register_component("NewsModule", ComponentType::Module, Vec::new())
            .await;
        tracker
            .update_readiness("NewsModule", ReadinessResult::success("up"))
            .await
            .expect("update succeeds");

        tracker
            .register_component("NewsModule", ComponentType::Module, Vec::new())
            .await;

        let record = tracker
            .get_component_readiness("NewsModule")
            .await
            .expect("record present");
        assert_eq!(record.state, ReadinessState::Ready);

        let system = tracker.system_readiness().await;
        assert_eq!(system.total_components, 1);
    }

    #[tokio::test]
    async fn update_against_unregistered_id_is_an_error() {
        let tracker = ReadinessTracker::new();
        let err = tracker
            .update_readiness("Ghost", ReadinessResult::success("up"))
            .await
            .expect_err("unregistered id must be rejected");
        assert!(matches!(err, Error::UnknownComponent { .. }));
    }

    #[tokio::test]
    async fn subscribers_observe_the_new_state_when_the_event_arrives() {
        let tracker = ReadinessTracker::new();
        tracker
            .register_component("AiModule", ComponentType::Module, Vec::new())
            .await;

        let mut receiver = tracker.subscribe();
        tracker
            .update_readiness("AiModule", ReadinessResult::initializing("warming caches"))
            .await
            .expect("update succeeds");

        let event = receiver.recv().await.expect("event delivered");
        assert_eq!(event.component_id, "AiModule");
        assert_eq!(event.previous_state, ReadinessState::NotStarted);
        assert_eq!(event.current_state, ReadinessState::Initializing);

        // Update-then-notify: the registry must already reflect the change.
        let record = tracker
            .get_component_readiness("AiModule")
            .await
            .expect("record present");
        assert_eq!(record.state, ReadinessState::Initializing);
    }

    #[tokio::test]
    async fn recovery_and_regression_transitions_are_recorded_verbatim() {
        let tracker = ReadinessTracker::new();
        tracker
            .register_component("GraphModule", ComponentType::Module, Vec::new())
            .await;

        for result in [
            ReadinessResult::failed("boom", Some("io".to_string())),
            ReadinessResult::success("recovered"),
            ReadinessResult::degraded("partial"),
        ] {
            let expected = result.state;
            tracker
                .update_readiness("GraphModule", result)
                .await
                .expect("recorder accepts any transition");
            let record = tracker
                .get_component_readiness("GraphModule")
                .await
                .expect("record present");
            assert_eq!(record.state, expected);
            assert_eq!(record.last_result.state, expected);
        }
    }
}
