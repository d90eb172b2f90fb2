use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Initialization state of a tracked component, ordered by severity for
/// aggregation: `Failed` dominates, `Ready` requires unanimity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ReadinessState {
    NotStarted,
    Initializing,
    Ready,
    Degraded,
    Failed,
}

impl ReadinessState {
    pub fn as_str(self) -> &'static str {
        match self {
            ReadinessState::NotStarted => "NotStarted",
            ReadinessState::Initializing => "Initializing",
            ReadinessState::Ready => "Ready",
            ReadinessState::Degraded => "Degraded",
            ReadinessState::Failed => "Failed",
        }
    }

    pub fn is_ready(self) -> bool {
        matches!(self, ReadinessState::Ready)
    }

    /// Precedence used when rolling component states up into a system verdict.
    pub fn severity(self) -> u8 {
        match self {
            ReadinessState::Ready => 0,
            ReadinessState::NotStarted => 1,
            ReadinessState::Degraded => 2,
            ReadinessState::Initializing => 3,
            ReadinessState::Failed => 4,
        }
    }
}

impl fmt::Display for ReadinessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Clients vary in casing conventions, so state names deserialize
// case-insensitively.
impl<'de> Deserialize<'de> for ReadinessState {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        match raw.to_ascii_lowercase().replace(['_', '-'], "").as_str() {
            "notstarted" => Ok(ReadinessState::NotStarted),
            "initializing" => Ok(ReadinessState::Initializing),
            "ready" => Ok(ReadinessState::Ready),
            "degraded" => Ok(ReadinessState::Degraded),
            "failed" => Ok(ReadinessState::Failed),
            other => Err(de::Error::custom(format!(
                "unknown readiness state `{other}`"
            ))),
        }
    }
}

/// Kind of tracked component.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ComponentType {
    Module,
    Endpoint,
}

impl ComponentType {
    pub fn as_str(self) -> &'static str {
        match self {
            ComponentType::Module => "Module",
            ComponentType::Endpoint => "Endpoint",
        }
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ComponentType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        match raw.to_ascii_lowercase().as_str() {
            "module" => Ok(ComponentType::Module),
            "endpoint" => Ok(ComponentType::Endpoint),
            other => Err(de::Error::custom(format!("unknown component type `{other}`"))),
        }
    }
}

/// Outcome of a single state report. Immutable once constructed; `error` is
/// only meaningful when `state == Failed`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessResult {
    pub state: ReadinessState,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ReadinessResult {
    fn new(state: ReadinessState, message: impl Into<String>) -> Self {
        Self {
            state,
            message: message.into(),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn not_started(message: impl Into<String>) -> Self {
        Self::new(ReadinessState::NotStarted, message)
    }

    pub fn initializing(message: impl Into<String>) -> Self {
        Self::new(ReadinessState::Initializing, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(ReadinessState::Ready, message)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::new(ReadinessState::Degraded, message)
    }

    pub fn failed(message: impl Into<String>, error: Option<String>) -> Self {
        let mut result = Self::new(ReadinessState::Failed, message);
        result.error = error;
        result
    }

    /// Build a result for an arbitrary state; used when mirroring module
    /// state onto endpoints.
    pub fn for_state(state: ReadinessState, message: impl Into<String>) -> Self {
        Self::new(state, message)
    }
}
