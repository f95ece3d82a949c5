//! Background task startup.
//!
//! # Responsibilities
//! - Start active health checks when enabled
//! - Follow the config file and apply validated reloads
//!
//! # Design Decisions
//! - Fail fast: a watcher that cannot start is an error, not a warning
//! - Reload loop owns the file watcher so it lives exactly as long as the loop

use std::path::Path;

use tokio::task::JoinHandle;

use crate::config::ConfigWatcher;
use crate::gateway::Gateway;
use crate::health::HealthMonitor;
use crate::lifecycle::shutdown::Shutdown;

/// Handles to the running background tasks.
#[derive(Debug)]
pub struct Background {
    shutdown: Shutdown,
    tasks: Vec<JoinHandle<()>>,
}

impl Background {
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Signal every task and wait for them to finish.
    pub async fn stop(self) {
        self.shutdown.trigger();
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Background task ended abnormally");
            }
        }
        tracing::info!("Background tasks stopped");
    }
}

/// Spawn the gateway's background tasks. Must be called within a Tokio runtime.
pub fn start_background(gateway: &Gateway, config_path: Option<&Path>) -> Result<Background, notify::Error> {
    let shutdown = Shutdown::new();
    let config = gateway.config();
    let mut tasks = Vec::new();

    if config.health_check.enabled {
        let monitor = HealthMonitor::new(
            gateway.config_store().clone(),
            gateway.resolver().clone(),
            gateway.transport().clone(),
        );
        tasks.push(tokio::spawn(monitor.run(shutdown.subscribe())));
    }

    if let Some(path) = config_path {
        let (watcher, mut updates) = ConfigWatcher::new(path);
        let watcher = watcher.run()?;
        let gateway = gateway.clone();
        let mut stop = shutdown.subscribe();

        tasks.push(tokio::spawn(async move {
            let _watcher = watcher;
            loop {
                tokio::select! {
                    update = updates.recv() => match update {
                        Some(next) => {
                            if let Err(errors) = gateway.apply_config(next) {
                                tracing::error!(errors = errors.len(), "Reloaded config rejected");
                            }
                        }
                        None => break,
                    },
                    _ = stop.recv() => {
                        tracing::info!("Config reload loop received shutdown signal, exiting loop");
                        break;
                    }
                }
            }
        }));
    }

    Ok(Background { shutdown, tasks })
}
