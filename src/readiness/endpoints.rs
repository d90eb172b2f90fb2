use crate::readiness::component::ComponentReadiness;
use crate::readiness::state::{ComponentType, ReadinessResult, ReadinessState};
use crate::readiness::tracker::ReadinessTracker;
use crate::state_transition;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Maps HTTP endpoint paths to their owning modules and mirrors module-level
/// state onto endpoint-shaped records. Owns no module logic.
///
/// Mirroring is event-driven: `spawn_mirror` subscribes to the underlying
/// tracker's change stream and propagates module transitions automatically.
/// The manual `update_module_endpoints` path is kept for callers that update
/// both registries in lockstep themselves.
#[derive(Clone)]
pub struct EndpointReadinessTracker {
    inner: Arc<EndpointInner>,
}

struct EndpointInner {
    tracker: ReadinessTracker,
    endpoints: RwLock<BTreeMap<String, ComponentReadiness>>,
}

impl EndpointReadinessTracker {
    pub fn new(tracker: ReadinessTracker) -> Self {
        Self {
            inner: Arc::new(EndpointInner {
                tracker,
                endpoints: RwLock::new(BTreeMap::new()),
            }),
        }
    }

    pub fn tracker(&self) -> &ReadinessTracker {
        &self.inner.tracker
    }

    /// Register one endpoint path under its owning module. Registering the
    /// same path twice keeps the existing record untouched.
    pub async fn register_endpoint(&self, path: &str, module_name: &str) {
        let mut guard = self.inner.endpoints.write().await;
        if guard.contains_key(path) {
            tracing::debug!(
                path,
                module = module_name,
                "duplicate endpoint registration ignored"
            );
            return;
        }

        let record = ComponentReadiness::register(
            path,
            ComponentType::Endpoint,
            vec![module_name.to_string()],
        )
        .with_metadata("module", module_name)
        .with_metadata("path", path);
        guard.insert(path.to_string(), record);
        drop(guard);

        tracing::info!(path, module = module_name, "endpoint registered");
    }

    pub async fn auto_register_module_endpoints<I, S>(&self, module_name: &str, paths: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for path in paths {
            self.register_endpoint(path.as_ref(), module_name).await;
        }
    }

    /// Mirror `state` onto every endpoint owned by `module_name`. A module
    /// with no registered endpoints is a defined no-op; endpoints of other
    /// modules are never touched.
    pub async fn update_module_endpoints(
        &self,
        module_name: &str,
        state: ReadinessState,
        message: &str,
    ) {
        let mut transitions = Vec::new();
        {
            let mut guard = self.inner.endpoints.write().await;
            for record in guard.values_mut() {
                if record.owning_module() != Some(module_name) {
                    continue;
                }
                let previous = record.state;
                record.apply(ReadinessResult::for_state(state, message));
                if previous != state {
                    transitions.push((record.component_id.clone(), previous));
                }
            }
        }

        if transitions.is_empty() {
            tracing::debug!(
                module = module_name,
                state = state.as_str(),
                "no endpoint transitions for module update"
            );
            return;
        }

        for (path, previous) in transitions {
            state_transition!(
                info,
                component = path.as_str(),
                from = previous.as_str(),
                to = state.as_str(),
                module = module_name,
            );
        }
    }

    /// Absent for any path never registered.
    pub async fn get_endpoint_readiness(&self, path: &str) -> Option<ComponentReadiness> {
        let guard = self.inner.endpoints.read().await;
        guard.get(path).cloned()
    }

    pub async fn get_endpoints_by_module(&self, module_name: &str) -> Vec<ComponentReadiness> {
        let guard = self.inner.endpoints.read().await;
        guard
            .values()
            .filter(|record| record.owning_module() == Some(module_name))
            .cloned()
            .collect()
    }

    pub async fn ready_endpoints(&self) -> Vec<ComponentReadiness> {
        let guard = self.inner.endpoints.read().await;
        guard
            .values()
            .filter(|record| record.state.is_ready())
            .cloned()
            .collect()
    }

    pub async fn not_ready_endpoints(&self) -> Vec<ComponentReadiness> {
        let guard = self.inner.endpoints.read().await;
        guard
            .values()
            .filter(|record| !record.state.is_ready())
            .cloned()
            .collect()
    }

    pub async fn all_endpoints(&self) -> Vec<ComponentReadiness> {
        let guard = self.inner.endpoints.read().await;
        guard.values().cloned().collect()
    }

    /// Background task that mirrors module change events from the underlying
    /// tracker onto mapped endpoints, so the two registries cannot drift.
    pub fn spawn_mirror(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let endpoints = self.clone();
        let mut receiver = self.inner.tracker.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = receiver.recv() => match event {
                        Ok(event) => {
                            endpoints
                                .update_module_endpoints(
                                    &event.component_id,
                                    event.current_state,
                                    &event.result.message,
                                )
                                .await;
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "endpoint mirror lagged behind the event stream");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::time::Duration;

    fn build() -> EndpointReadinessTracker {
        EndpointReadinessTracker::new(ReadinessTracker::new())
    }

    #[tokio::test]
    async fn module_update_reaches_every_mapped_endpoint() {
        let endpoints = build();
        endpoints
            .register_endpoint("/api/news/latest", "NewsModule")
            .await;
        endpoints
            .register_endpoint("/api/news/search", "NewsModule")
            .await;

        endpoints
            .update_module_endpoints("NewsModule", ReadinessState::Ready, "Module ready")
            .await;

        let record = endpoints
            .get_endpoint_readiness("/api/news/latest")
            .await
            .expect("endpoint registered");
        assert_eq!(record.state, ReadinessState::Ready);
        assert!(record.last_result.message.contains("Module ready"));
        assert_eq!(record.owning_module(), Some("NewsModule"));
    }

    #[tokio::test]
    async fn unknown_module_update_is_a_noop() {
        let endpoints = build();
        endpoints
            .register_endpoint("/api/concepts", "ConceptModule")
            .await;

        endpoints
            .update_module_endpoints("UnknownModule", ReadinessState::Ready, "x")
            .await;

        let record = endpoints
            .get_endpoint_readiness("/api/concepts")
            .await
            .expect("endpoint registered");
        assert_eq!(record.state, ReadinessState::NotStarted);
    }

    #[tokio::test]
    async fn unregistered_path_is_absent() {
        let endpoints = build();
        assert!(endpoints.get_endpoint_readiness("/api/unknown").await.is_none());
        assert!(endpoints.all_endpoints().await.is_empty());
    }

    #[tokio::test]
    async fn endpoints_by_module_returns_exactly_that_modules_paths() {
        let endpoints = build();
        endpoints
            .auto_register_module_endpoints("NewsModule", ["/api/news/latest", "/api/news/search"])
            .await;
        endpoints
            .auto_register_module_endpoints("AiModule", ["/api/ai/assist"])
            .await;

        let news = endpoints.get_endpoints_by_module("NewsModule").await;
        assert_eq!(news.len(), 2);
        assert!(news
            .iter()
            .all(|record| record.owning_module() == Some("NewsModule")));
    }

    #[tokio::test]
    async fn ready_and_not_ready_partition_all_endpoints() {
        let endpoints = build();
        endpoints
            .auto_register_module_endpoints("NewsModule", ["/api/news/latest"])
            .await;
        endpoints
            .auto_register_module_endpoints("AiModule", ["/api/ai/assist", "/api/ai/models"])
            .await;
        endpoints
            .update_module_endpoints("AiModule", ReadinessState::Ready, "up")
            .await;

        let ready: BTreeSet<String> = endpoints
            .ready_endpoints()
            .await
            .into_iter()
            .map(|record| record.component_id)
            .collect();
        let not_ready: BTreeSet<String> = endpoints
            .not_ready_endpoints()
            .await
            .into_iter()
            .map(|record| record.component_id)
            .collect();
        let all: BTreeSet<String> = endpoints
            .all_endpoints()
            .await
            .into_iter()
            .map(|record| record.component_id)
            .collect();

        assert!(ready.is_disjoint(&not_ready));
        let union: BTreeSet<String> = ready.union(&not_ready).cloned().collect();
        assert_eq!(union, all);
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn duplicate_registration_keeps_existing_state() {
        let endpoints = build();
        endpoints
            .register_endpoint("/api/news/latest", "NewsModule")
            .await;
        endpoints
            .update_module_endpoints("NewsModule", ReadinessState::Ready, "up")
            .await;

        endpoints
            .register_endpoint("/api/news/latest", "NewsModule")
            .await;

        let record = endpoints
            .get_endpoint_readiness("/api/news/latest")
            .await
            .expect("endpoint registered");
        assert_eq!(record.state, ReadinessState::Ready);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn mirror_propagates_tracker_updates_without_manual_calls() {
        let tracker = ReadinessTracker::new();
        tracker
            .register_component("NewsModule", ComponentType::Module, Vec::new())
            .await;

        let endpoints = EndpointReadinessTracker::new(tracker.clone());
        endpoints
            .register_endpoint("/api/news/latest", "NewsModule")
            .await;

        let shutdown = CancellationToken::new();
        let mirror = endpoints.spawn_mirror(shutdown.clone());

        tracker
            .update_readiness("NewsModule", ReadinessResult::success("Module ready"))
            .await
            .expect("update succeeds");

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            let record = endpoints
                .get_endpoint_readiness("/api/news/latest")
                .await
                .expect("endpoint registered");
            if record.state == ReadinessState::Ready {
                assert!(record.last_result.message.contains("Module ready"));
                break;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "mirror did not propagate the module update in time"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        shutdown.cancel();
        let _ = mirror.await;
    }
}
