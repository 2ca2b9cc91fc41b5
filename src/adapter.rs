//! Host-facing adapter managing kismet server connections.
//!
//! The adapter owns the registry of active connections and exposes the
//! lifecycle the host drives: `start`/`stop` for the adapter itself and
//! `activate`/`deactivate` for individual listener registrations. Each
//! activation validates its configuration, establishes one connection,
//! and schedules its worker on the runtime handle supplied at start.

use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::ActivationConfig;
use crate::connection::{ReleaseHandle, ServerConnection};
use crate::delivery::ListenerFactory;
use crate::stats::ConnectionStats;

/// Errors surfaced to the host from activation.
#[derive(Debug, Error)]
pub enum ActivationError {
    #[error("invalid activation config: {0}")]
    InvalidConfig(String),

    #[error("adapter has not been started")]
    NotStarted,

    #[error("failed to establish new connection to kismet server at {server_name} on port {port}")]
    Establish {
        server_name: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },
}

/// One active registration: the connection's identity plus the handles
/// needed to stop it.
struct ActiveConnection {
    config: ActivationConfig,
    factory: Arc<dyn ListenerFactory>,
    release: ReleaseHandle,
    task: JoinHandle<()>,
}

/// The registry of active connections, keyed by the pair of activation
/// configuration and listener factory identity.
#[derive(Default)]
struct ConnectionRegistry {
    entries: Vec<ActiveConnection>,
}

impl ConnectionRegistry {
    fn add(&mut self, entry: ActiveConnection) {
        self.entries.push(entry);
    }

    /// Remove the entry matching the given config and factory, if any.
    /// Factory identity is pointer identity: the same `Arc` that was
    /// passed to `activate`.
    fn remove(
        &mut self,
        config: &ActivationConfig,
        factory: &Arc<dyn ListenerFactory>,
    ) -> Option<ActiveConnection> {
        let index = self
            .entries
            .iter()
            .position(|e| e.config == *config && Arc::ptr_eq(&e.factory, factory))?;
        Some(self.entries.remove(index))
    }

    fn drain(&mut self) -> Vec<ActiveConnection> {
        std::mem::take(&mut self.entries)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// The adapter used to talk to kismet servers on behalf of the host.
pub struct DroneAdapter {
    runtime: Mutex<Option<Handle>>,
    registry: Mutex<ConnectionRegistry>,
    stats: Arc<ConnectionStats>,
}

impl DroneAdapter {
    /// Create a stopped adapter.
    pub fn new() -> Self {
        Self {
            runtime: Mutex::new(None),
            registry: Mutex::new(ConnectionRegistry::default()),
            stats: Arc::new(ConnectionStats::new()),
        }
    }

    /// The shared ingestion statistics for all of this adapter's
    /// connections.
    pub fn stats(&self) -> Arc<ConnectionStats> {
        Arc::clone(&self.stats)
    }

    /// Number of currently active connections.
    pub fn active_connections(&self) -> usize {
        self.registry.lock().unwrap().len()
    }

    /// Start the adapter on the given runtime handle. Workers for
    /// subsequent activations are scheduled on it.
    pub fn start(&self, runtime: Handle) {
        info!("Starting kismet drone adapter");
        *self.runtime.lock().unwrap() = Some(runtime);
    }

    /// Stop the adapter, releasing every active connection and waiting
    /// for the workers to finish.
    pub async fn stop(&self) {
        info!("Stopping kismet drone adapter");
        *self.runtime.lock().unwrap() = None;

        let entries = self.registry.lock().unwrap().drain();
        for entry in entries {
            entry.release.release();
            if let Err(e) = entry.task.await {
                warn!("Connection worker for {} ended abnormally: {}", entry.config, e);
            }
        }
    }

    /// Activate a listener registration: validate the configuration,
    /// establish a connection to the kismet server, and schedule its
    /// worker for execution.
    pub async fn activate(
        &self,
        config: ActivationConfig,
        factory: Arc<dyn ListenerFactory>,
    ) -> Result<(), ActivationError> {
        info!("Activating kismet listener registration for {}", config);

        config
            .validate()
            .map_err(|e| ActivationError::InvalidConfig(e.to_string()))?;

        let runtime = self
            .runtime
            .lock()
            .unwrap()
            .clone()
            .ok_or(ActivationError::NotStarted)?;

        let (connection, release) = ServerConnection::establish(
            config.clone(),
            Arc::clone(&factory),
            Arc::clone(&self.stats),
        )
        .await
        .map_err(|source| ActivationError::Establish {
            server_name: config.server_name.clone(),
            port: config.port,
            source,
        })?;

        let entry = ActiveConnection {
            config: connection.config().clone(),
            factory: Arc::clone(connection.factory()),
            release,
            task: runtime.spawn(connection.run()),
        };
        self.registry.lock().unwrap().add(entry);
        Ok(())
    }

    /// Deactivate a listener registration.
    ///
    /// Releases the matching connection and waits until its worker has
    /// fully stopped. Returns whether a matching registration existed;
    /// deactivating an unknown registration is not an error.
    pub async fn deactivate(
        &self,
        config: &ActivationConfig,
        factory: &Arc<dyn ListenerFactory>,
    ) -> bool {
        info!("Deactivating kismet listener registration for {}", config);

        let entry = self.registry.lock().unwrap().remove(config, factory);
        match entry {
            Some(entry) => {
                entry.release.release();
                if let Err(e) = entry.task.await {
                    warn!("Connection worker for {} ended abnormally: {}", entry.config, e);
                }
                true
            }
            None => false,
        }
    }
}

impl Default for DroneAdapter {
    fn default() -> Self {
        Self::new()
    }
}
