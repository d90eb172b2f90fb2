//! Readiness tracking and endpoint gating for modular backend services.
//!
//! Modules register with the [`readiness::ReadinessTracker`] and report their
//! state as they initialize; the tracker aggregates those reports into a
//! system verdict and broadcasts change events. The HTTP surface exposes the
//! readiness picture, streams transitions over SSE, and gates registered
//! module endpoints until their owning module is ready.

pub mod app;
pub mod app_state;
pub mod config;
pub mod error;
pub mod logging;
pub mod readiness;
pub mod telemetry;
pub mod transport;
