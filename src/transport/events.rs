#![forbid(unsafe_code)]
//! Server-sent readiness events.
//!
//! The stream merges two sources: component change notifications taken from
//! the tracker's broadcast channel, and periodic system rollup snapshots so a
//! client that attaches mid-flight still converges on the current picture.

use crate::app_state::AppState;
use crate::readiness::{ReadinessEvent, SystemReadiness};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Extension;
use futures::stream::{self, Stream, StreamExt};
use std::convert::Infallible;
use tokio::sync::broadcast::error::RecvError;

pub async fn readiness_events(
    Extension(state): Extension<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.tracker.subscribe();
    let component_frames = stream::unfold(receiver, |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(event) => return Some((component_changed_frame(&event), receiver)),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "sse subscriber lagged; change events dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    // The first tick fires immediately, so every new subscriber receives a
    // system snapshot up front.
    let period = state.settings.events.system_period;
    let snapshot_frames = stream::unfold(
        (state.tracker.clone(), tokio::time::interval(period)),
        |(tracker, mut interval)| async move {
            interval.tick().await;
            let frame = system_state_frame(&tracker.system_readiness().await);
            Some((frame, (tracker, interval)))
        },
    );

    let merged = stream::select(component_frames, snapshot_frames).map(Ok::<Event, Infallible>);

    Sse::new(merged).keep_alive(KeepAlive::new().interval(state.settings.events.keepalive))
}

// Frames are plain `data:` lines; the payload's `type` field discriminates.
fn component_changed_frame(event: &ReadinessEvent) -> Event {
    Event::default().data(component_changed_payload(event).to_string())
}

fn system_state_frame(snapshot: &SystemReadiness) -> Event {
    Event::default().data(system_state_payload(snapshot).to_string())
}

fn component_changed_payload(event: &ReadinessEvent) -> serde_json::Value {
    serde_json::json!({
        "type": "component-changed",
        "componentId": event.component_id,
        "previousState": event.previous_state.as_str(),
        "currentState": event.current_state.as_str(),
        "message": event.result.message,
        "timestamp": event.timestamp.to_rfc3339(),
    })
}

fn system_state_payload(snapshot: &SystemReadiness) -> serde_json::Value {
    serde_json::json!({
        "type": "system-state",
        "overallState": snapshot.overall_state.as_str(),
        "readyComponents": snapshot.ready_components,
        "totalComponents": snapshot.total_components,
        "isFullyReady": snapshot.is_fully_ready,
        "timestamp": snapshot.last_updated.to_rfc3339(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readiness::{ReadinessResult, ReadinessState};

    #[test]
    fn component_payload_carries_both_states() {
        let result = ReadinessResult::success("warmed");
        let event = ReadinessEvent {
            component_id: "NewsModule".to_string(),
            previous_state: ReadinessState::Initializing,
            current_state: ReadinessState::Ready,
            timestamp: result.timestamp,
            result,
        };

        let payload = component_changed_payload(&event);
        assert_eq!(payload["type"], "component-changed");
        assert_eq!(payload["componentId"], "NewsModule");
        assert_eq!(payload["previousState"], "Initializing");
        assert_eq!(payload["currentState"], "Ready");
    }

    #[test]
    fn system_payload_reports_the_rollup_counts() {
        let snapshot = SystemReadiness::from_components(Vec::new());
        let payload = system_state_payload(&snapshot);
        assert_eq!(payload["type"], "system-state");
        assert_eq!(payload["totalComponents"], 0);
        assert_eq!(payload["isFullyReady"], false);
        assert_eq!(payload["overallState"], "NotStarted");
    }
}
