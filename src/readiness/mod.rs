//! Component readiness tracking.
//!
//! [`ReadinessTracker`] is the process-wide registry of module readiness and
//! the source of change events. [`EndpointReadinessTracker`] layers an
//! endpoint-to-module mapping on top, so the HTTP surface can gate individual
//! paths on the state of the module that serves them.

pub mod component;
pub mod endpoints;
pub mod state;
pub mod tracker;

pub use component::{ComponentReadiness, SystemReadiness};
pub use endpoints::EndpointReadinessTracker;
pub use state::{ComponentType, ReadinessResult, ReadinessState};
pub use tracker::{ReadinessEvent, ReadinessTracker};
