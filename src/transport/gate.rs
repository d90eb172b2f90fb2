#![forbid(unsafe_code)]
//! Request gating for endpoints with a registered readiness record.
//!
//! Paths that were never registered pass straight through; a registered path
//! is served only while its record reports `Ready`. Rejections are JSON 503s
//! with a `Retry-After` hint so clients can back off instead of hammering a
//! module that is still warming up.

use crate::app_state::AppState;
use axum::body::Body;
use axum::extract::Request;
use axum::http::{
    header::{CACHE_CONTROL, CONTENT_TYPE, RETRY_AFTER},
    Response, StatusCode,
};
use axum::middleware::Next;
use axum::Extension;
use chrono::Utc;
use std::time::Duration;

pub async fn gate_request(
    Extension(state): Extension<AppState>,
    request: Request,
    next: Next,
) -> axum::response::Response {
    let path = request.uri().path().to_string();

    // Control routes stay reachable even if a module claims their path in
    // its endpoint list; liveness and the readiness documents are never gated.
    if is_reserved_path(&path) {
        return next.run(request).await;
    }

    let record = state.endpoints.get_endpoint_readiness(&path).await;
    match record {
        Some(record) if !record.state.is_ready() => {
            tracing::debug!(
                path = path.as_str(),
                state = record.state.as_str(),
                "request rejected by readiness gate"
            );
            let retry_after = retry_after_hint_seconds(state.settings.gate.retry_after);
            build_not_ready_response(&path, retry_after)
        }
        _ => next.run(request).await,
    }
}

/// Control routes win over module endpoints declared on the same path: they
/// are skipped at mount time and bypass the gate.
pub fn is_reserved_path(path: &str) -> bool {
    path == "/health"
        || path == "/metrics"
        || path == "/readiness"
        || path.starts_with("/readiness/")
}

/// Seconds clients should wait before retrying a gated endpoint. Always at
/// least one second so `Retry-After: 0` never escapes.
pub fn retry_after_hint_seconds(window: Duration) -> u64 {
    let hint = window.as_secs_f64().ceil() as u64;
    hint.max(1)
}

fn build_not_ready_response(path: &str, retry_after: u64) -> axum::response::Response {
    let payload = serde_json::json!({
        "error": "ENDPOINT_UNAVAILABLE",
        "path": path,
        "ts": Utc::now().to_rfc3339(),
    });
    Response::builder()
        .status(StatusCode::SERVICE_UNAVAILABLE)
        .header(CONTENT_TYPE, "application/json")
        .header(CACHE_CONTROL, "no-store")
        .header(RETRY_AFTER, retry_after.to_string())
        .body(Body::from(payload.to_string()))
        .expect("endpoint gate response")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_paths_are_reserved() {
        assert!(is_reserved_path("/health"));
        assert!(is_reserved_path("/metrics"));
        assert!(is_reserved_path("/readiness"));
        assert!(is_reserved_path("/readiness/modules"));
        assert!(!is_reserved_path("/api/news/latest"));
        assert!(!is_reserved_path("/readinessx"));
    }

    #[test]
    fn retry_after_hint_rounds_up_and_never_hits_zero() {
        assert_eq!(retry_after_hint_seconds(Duration::from_millis(0)), 1);
        assert_eq!(retry_after_hint_seconds(Duration::from_millis(200)), 1);
        assert_eq!(retry_after_hint_seconds(Duration::from_millis(1500)), 2);
        assert_eq!(retry_after_hint_seconds(Duration::from_secs(5)), 5);
    }
}
