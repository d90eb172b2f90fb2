#![forbid(unsafe_code)]
use crate::app_state::AppState;
use crate::config::HttpConfig;
use crate::error::{Context, Result};
use crate::readiness::{ComponentType, ReadinessState, SystemReadiness};
use crate::transport::events::readiness_events;
use crate::transport::gate::{gate_request, is_reserved_path};
use axum::body::Body;
use axum::extract::Path;
use axum::http::{header::CONTENT_TYPE, Response, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{middleware, Extension, Json, Router};
use chrono::Utc;
use serde_json::json;
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;

pub struct ReadinessServer {
    addr: SocketAddr,
}

impl ReadinessServer {
    pub fn build(config: &HttpConfig) -> Result<Self> {
        let addr: SocketAddr = format!("{}:{}", config.host, config.port)
            .parse()
            .with_context(|| {
                format!("invalid http listen address {}:{}", config.host, config.port)
            })?;

        Ok(Self { addr })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn serve(self, state: AppState, shutdown: CancellationToken) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .with_context(|| format!("failed to bind http listener on {}", self.addr))?;

        let mut router = Router::new()
            .route("/health", get(health))
            .route("/readiness", get(system_readiness))
            .route("/readiness/modules", get(module_list))
            .route("/readiness/modules/:id", get(module_detail))
            .route("/readiness/ready", get(ready_endpoints))
            .route("/readiness/not-ready", get(not_ready_endpoints))
            .route("/readiness/events", get(readiness_events))
            .route("/metrics", get(metrics));

        for record in state.endpoints.all_endpoints().await {
            let path = record.component_id.clone();
            if is_reserved_path(&path) {
                tracing::warn!(
                    path = path.as_str(),
                    "skipping module endpoint because its path conflicts with a control route"
                );
                continue;
            }

            let module = record.owning_module().unwrap_or_default().to_string();
            let route_path = path.clone();
            router = router.route(
                path.as_str(),
                get(move || serve_module_endpoint(module.clone(), route_path.clone())),
            );
        }

        router = router
            .layer(middleware::from_fn(gate_request))
            .layer(Extension(state));

        tracing::info!("readiness server listening on {}", self.addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
            })
            .await
            .context("readiness server exited abnormally")?;

        Ok(())
    }
}

async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "ts": Utc::now().to_rfc3339(),
        })),
    )
}

async fn system_readiness(Extension(state): Extension<AppState>) -> impl IntoResponse {
    Json(state.tracker.system_readiness().await)
}

async fn module_list(Extension(state): Extension<AppState>) -> impl IntoResponse {
    Json(state.tracker.components_of_type(ComponentType::Module).await)
}

async fn module_detail(
    Extension(state): Extension<AppState>,
    Path(id): Path<String>,
) -> axum::response::Response {
    match state.tracker.get_component_readiness(&id).await {
        Some(record) => Json(record).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": "UNKNOWN_COMPONENT",
                "componentId": id,
                "ts": Utc::now().to_rfc3339(),
            })),
        )
            .into_response(),
    }
}

async fn ready_endpoints(Extension(state): Extension<AppState>) -> impl IntoResponse {
    Json(state.endpoints.ready_endpoints().await)
}

async fn not_ready_endpoints(Extension(state): Extension<AppState>) -> impl IntoResponse {
    Json(state.endpoints.not_ready_endpoints().await)
}

/// Placeholder body served for a registered module endpoint once its module
/// is ready. Real module handlers would be mounted here by the host service.
async fn serve_module_endpoint(module: String, path: String) -> impl IntoResponse {
    Json(json!({
        "module": module,
        "path": path,
        "ts": Utc::now().to_rfc3339(),
    }))
}

async fn metrics(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let snapshot = state.tracker.system_readiness().await;
    let body = metrics_body(&snapshot);

    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "text/plain; version=0.0.4")
        .body(Body::from(body))
        .expect("metrics response")
}

fn metrics_body(snapshot: &SystemReadiness) -> String {
    let mut output = String::new();

    output.push_str("# HELP beacon_system_state Aggregate readiness state (0=NOT_STARTED,1=INITIALIZING,2=READY,3=DEGRADED,4=FAILED)\n");
    output.push_str("# TYPE beacon_system_state gauge\n");
    output.push_str(&format!(
        "beacon_system_state {}\n",
        readiness_state_gauge(snapshot.overall_state)
    ));

    output.push_str("# HELP beacon_system_fully_ready Whether every registered component is ready\n");
    output.push_str("# TYPE beacon_system_fully_ready gauge\n");
    output.push_str(&format!(
        "beacon_system_fully_ready {}\n",
        if snapshot.is_fully_ready { 1 } else { 0 }
    ));

    output.push_str("# HELP beacon_component_state Component readiness state (0=NOT_STARTED,1=INITIALIZING,2=READY,3=DEGRADED,4=FAILED)\n");
    output.push_str("# TYPE beacon_component_state gauge\n");
    for component in &snapshot.components {
        output.push_str(&format!(
            "beacon_component_state{{component=\"{}\",type=\"{}\"}} {}\n",
            bounded_label(&component.component_id),
            component.component_type.as_str(),
            readiness_state_gauge(component.state)
        ));
    }

    output.push_str("# HELP beacon_components_total Registered components by current state\n");
    output.push_str("# TYPE beacon_components_total gauge\n");
    for (label, count) in [
        ("ready", snapshot.ready_components),
        ("initializing", snapshot.initializing_components),
        ("degraded", snapshot.degraded_components),
        ("failed", snapshot.failed_components),
    ] {
        output.push_str(&format!(
            "beacon_components_total{{state=\"{}\"}} {}\n",
            label, count
        ));
    }
    output.push_str(&format!(
        "beacon_components_total{{state=\"all\"}} {}\n",
        snapshot.total_components
    ));

    output
}

fn readiness_state_gauge(state: ReadinessState) -> u8 {
    match state {
        ReadinessState::NotStarted => 0,
        ReadinessState::Initializing => 1,
        ReadinessState::Ready => 2,
        ReadinessState::Degraded => 3,
        ReadinessState::Failed => 4,
    }
}

fn bounded_label(value: &str) -> String {
    const MAX_LEN: usize = 64;
    if value.len() <= MAX_LEN {
        value.to_string()
    } else {
        value.chars().take(MAX_LEN).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readiness::{ComponentReadiness, ReadinessResult};

    fn component(id: &str, state: ReadinessState) -> ComponentReadiness {
        let mut record = ComponentReadiness::register(id, ComponentType::Module, Vec::new());
        record.apply(ReadinessResult::for_state(state, "test"));
        record
    }

    #[test]
    fn metrics_body_exposes_system_and_component_gauges() {
        let snapshot = SystemReadiness::from_components(vec![
            component("NewsModule", ReadinessState::Ready),
            component("AiModule", ReadinessState::Initializing),
        ]);

        let body = metrics_body(&snapshot);
        assert!(body.contains("beacon_system_state 1\n"));
        assert!(body.contains("beacon_component_state{component=\"NewsModule\",type=\"Module\"} 2\n"));
        assert!(body.contains("beacon_component_state{component=\"AiModule\",type=\"Module\"} 1\n"));
        assert!(body.contains("beacon_components_total{state=\"all\"} 2\n"));
        assert!(body.contains("beacon_system_fully_ready 0\n"));
    }

    #[test]
    fn long_component_labels_are_truncated() {
        let long = "x".repeat(200);
        assert_eq!(bounded_label(&long).len(), 64);
        assert_eq!(bounded_label("short"), "short");
    }
}
