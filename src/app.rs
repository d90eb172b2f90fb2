use crate::app_state::AppState;
use crate::config::BeaconConfig;
use crate::error::{Context, Result};
use crate::readiness::{ComponentType, EndpointReadinessTracker, ReadinessTracker};
use crate::transport::ReadinessServer;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct BeaconApp {
    state: AppState,
    server: ReadinessServer,
    shutdown: CancellationToken,
}

impl BeaconApp {
    pub async fn initialise(config: BeaconConfig) -> Result<Self> {
        let tracker = ReadinessTracker::with_event_buffer(config.events.buffer);
        let endpoints = EndpointReadinessTracker::new(tracker.clone());

        for module in &config.modules {
            tracker
                .register_component(&module.name, ComponentType::Module, module.depends_on.clone())
                .await;
            endpoints
                .auto_register_module_endpoints(&module.name, &module.endpoints)
                .await;
        }

        tracing::info!(
            module_count = config.modules.len(),
            "registered configured modules"
        );

        let server = ReadinessServer::build(&config.http)
            .context("failed to construct readiness server")?;

        Ok(Self {
            state: AppState::new(tracker, endpoints, Arc::new(config)),
            server,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            state,
            server,
            shutdown,
        } = self;

        let mirror = state.endpoints.spawn_mirror(shutdown.clone());

        let mut server_task = {
            let server_state = state.clone();
            let server_shutdown = shutdown.clone();
            tokio::spawn(async move { server.serve(server_state, server_shutdown).await })
        };

        // Startup announcer: report once when every configured module is
        // ready, or warn if the startup window passes first.
        if !state.settings.modules.is_empty() {
            let tracker = state.tracker.clone();
            let ready_timeout = state.settings.startup.ready_timeout;
            tokio::spawn(async move {
                match tracker.wait_for_system_ready(ready_timeout).await {
                    Ok(snapshot) => tracing::info!(
                        ready = snapshot.ready_components,
                        total = snapshot.total_components,
                        "all modules reported ready"
                    ),
                    Err(err) => tracing::warn!(
                        error = %err,
                        "system did not become fully ready within the startup window"
                    ),
                }
            });
        }

        tracing::info!("beacon service ready; press Ctrl+C to stop");

        tokio::select! {
            res = &mut server_task => {
                tracing::warn!("readiness server task terminated unexpectedly");
                shutdown.cancel();
                let _ = mirror.await;
                return match res {
                    Ok(result) => result,
                    Err(join_err) => Err(crate::err!("readiness server join error: {join_err}")),
                };
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received");
            }
        }

        shutdown.cancel();

        match server_task.await {
            Ok(result) => result.context("readiness server failed during shutdown")?,
            Err(join_err) => return Err(crate::err!("readiness server join error: {join_err}")),
        }

        let _ = mirror.await;
        Ok(())
    }
}
