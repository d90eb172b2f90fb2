use crate::readiness::state::{ComponentType, ReadinessResult, ReadinessState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Current tracked state of one registered component. `component_id` is
/// immutable after registration; `last_updated` and `last_result.timestamp`
/// are always set together.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentReadiness {
    #[serde(alias = "componentid")]
    pub component_id: String,
    #[serde(alias = "componenttype")]
    pub component_type: ComponentType,
    pub state: ReadinessState,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, JsonValue>,
    #[serde(alias = "lastresult")]
    pub last_result: ReadinessResult,
    #[serde(alias = "lastupdated")]
    pub last_updated: DateTime<Utc>,
}

impl ComponentReadiness {
    /// New record in `NotStarted`, as produced by registration.
    pub fn register(
        component_id: impl Into<String>,
        component_type: ComponentType,
        dependencies: Vec<String>,
    ) -> Self {
        let result = ReadinessResult::not_started("registered");
        let last_updated = result.timestamp;
        Self {
            component_id: component_id.into(),
            component_type,
            state: ReadinessState::NotStarted,
            dependencies,
            metadata: BTreeMap::new(),
            last_result: result,
            last_updated,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Replace state, last result and timestamp in one step. This is the only
    /// mutation path, which keeps `state` and `last_result.state` in lockstep.
    pub fn apply(&mut self, result: ReadinessResult) {
        self.state = result.state;
        self.last_updated = result.timestamp;
        self.last_result = result;
    }

    pub fn owning_module(&self) -> Option<&str> {
        self.metadata.get("module").and_then(JsonValue::as_str)
    }
}

/// Rollup over all registered components, recomputed on every read from a
/// point-in-time snapshot.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemReadiness {
    pub components: Vec<ComponentReadiness>,
    #[serde(alias = "totalcomponents")]
    pub total_components: usize,
    #[serde(alias = "readycomponents")]
    pub ready_components: usize,
    #[serde(alias = "initializingcomponents")]
    pub initializing_components: usize,
    #[serde(alias = "failedcomponents")]
    pub failed_components: usize,
    #[serde(alias = "degradedcomponents")]
    pub degraded_components: usize,
    #[serde(alias = "overallstate")]
    pub overall_state: ReadinessState,
    #[serde(alias = "isfullyready")]
    pub is_fully_ready: bool,
    #[serde(alias = "lastupdated")]
    pub last_updated: DateTime<Utc>,
}

impl SystemReadiness {
    /// Compute the aggregate verdict from a snapshot of component records.
    /// Most severe state wins; an empty registry reports `NotStarted`.
    pub fn from_components(components: Vec<ComponentReadiness>) -> Self {
        let total = components.len();
        let mut ready = 0;
        let mut initializing = 0;
        let mut failed = 0;
        let mut degraded = 0;
        let mut not_started = 0;

        for component in &components {
            match component.state {
                ReadinessState::Ready => ready += 1,
                ReadinessState::Initializing => initializing += 1,
                ReadinessState::Failed => failed += 1,
                ReadinessState::Degraded => degraded += 1,
                ReadinessState::NotStarted => not_started += 1,
            }
        }

        let overall_state = if total == 0 {
            ReadinessState::NotStarted
        } else if failed > 0 {
            ReadinessState::Failed
        } else if initializing > 0 {
            ReadinessState::Initializing
        } else if degraded > 0 {
            ReadinessState::Degraded
        } else if not_started > 0 {
            ReadinessState::NotStarted
        } else {
            ReadinessState::Ready
        };

        Self {
            components,
            total_components: total,
            ready_components: ready,
            initializing_components: initializing,
            failed_components: failed,
            degraded_components: degraded,
            overall_state,
            is_fully_ready: total > 0 && ready == total,
            last_updated: Utc::now(),
        }
    }
}
