//! High-level runtime orchestrator.
//!
//! The runtime owns background workers, wires up command/event channels, and
//! exposes a builder-based API for clients to drive a combat session.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::debug;

use combat_core::EngineConfig;

use crate::api::{CombatApi, PushTransport, Result, RuntimeError, SessionHandle};
use crate::events::{Event, EventBus, Topic};
use crate::workers::{Command, PollingWorker, PushWorker, SessionChannels, SessionWorker};

/// Runtime configuration shared across the orchestrator and workers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub poll_interval: Duration,
    pub reconnect_interval: Duration,
    /// How often remaining cooldowns are recomputed while any is active.
    pub cooldown_refresh_interval: Duration,
    pub default_skill_cooldown: Duration,
    pub log_capacity: usize,
    pub dedup_grace: usize,
    pub command_buffer_size: usize,
    pub event_buffer_size: usize,
}

impl RuntimeConfig {
    pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(5);
    pub const DEFAULT_COOLDOWN_REFRESH: Duration = Duration::from_millis(200);

    /// Engine settings derived from this configuration.
    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            log_capacity: self.log_capacity,
            dedup_grace: self.dedup_grace,
            poll_interval: self.poll_interval,
            default_skill_cooldown: self.default_skill_cooldown,
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            poll_interval: EngineConfig::DEFAULT_POLL_INTERVAL,
            reconnect_interval: Self::DEFAULT_RECONNECT_INTERVAL,
            cooldown_refresh_interval: Self::DEFAULT_COOLDOWN_REFRESH,
            default_skill_cooldown: EngineConfig::DEFAULT_SKILL_COOLDOWN,
            log_capacity: EngineConfig::DEFAULT_LOG_CAPACITY,
            dedup_grace: EngineConfig::DEFAULT_DEDUP_GRACE,
            command_buffer_size: 32,
            event_buffer_size: 100,
        }
    }
}

/// Main runtime that orchestrates a combat session
///
/// Design: Runtime owns workers and coordinates execution.
/// [`SessionHandle`] provides a cloneable façade for clients.
pub struct CombatRuntime {
    handle: SessionHandle,

    session_worker: JoinHandle<()>,
    polling_worker: JoinHandle<()>,
    push_worker: Option<JoinHandle<()>>,
}

impl CombatRuntime {
    /// Create a new runtime builder
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Get a cloneable handle to this runtime
    ///
    /// The handle can be shared across clients and async tasks.
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<Event> {
        self.handle.subscribe(topic)
    }

    /// Shutdown the runtime gracefully
    ///
    /// Stopping the session worker closes the watches the other workers
    /// follow, so they wind down on their own.
    pub async fn shutdown(self) -> Result<()> {
        if self.handle.shutdown().await.is_err() {
            debug!("session worker already stopped");
        }

        self.session_worker
            .await
            .map_err(RuntimeError::WorkerJoin)?;
        self.polling_worker
            .await
            .map_err(RuntimeError::WorkerJoin)?;
        if let Some(push_worker) = self.push_worker {
            push_worker.await.map_err(RuntimeError::WorkerJoin)?;
        }

        Ok(())
    }
}

/// Builder for [`CombatRuntime`] with flexible configuration.
pub struct RuntimeBuilder {
    config: RuntimeConfig,
    api: Option<Arc<dyn CombatApi>>,
    push: Option<Arc<dyn PushTransport>>,
}

impl RuntimeBuilder {
    fn new() -> Self {
        Self {
            config: RuntimeConfig::default(),
            api: None,
            push: None,
        }
    }

    /// Override runtime configuration
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the required request/response transport
    pub fn api(mut self, api: impl CombatApi + 'static) -> Self {
        self.api = Some(Arc::new(api));
        self
    }

    pub fn api_arc(mut self, api: Arc<dyn CombatApi>) -> Self {
        self.api = Some(api);
        self
    }

    /// Set the push transport (optional; polling alone still works)
    pub fn push_transport(mut self, push: impl PushTransport + 'static) -> Self {
        self.push = Some(Arc::new(push));
        self
    }

    pub fn push_transport_arc(mut self, push: Arc<dyn PushTransport>) -> Self {
        self.push = Some(push);
        self
    }

    /// Build the runtime and spawn its workers
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> Result<CombatRuntime> {
        let api = self.api.ok_or(RuntimeError::MissingApi)?;
        let config = self.config;

        let (command_tx, command_rx) = mpsc::channel::<Command>(config.command_buffer_size.max(1));
        let event_bus = EventBus::with_capacity(config.event_buffer_size);

        let (snapshot_tx, snapshot_rx) = watch::channel(None);
        let (polling_tx, polling_rx) = watch::channel(None);
        let (character_tx, character_rx) = watch::channel(None);

        let handle = SessionHandle::new(command_tx.clone(), snapshot_rx, event_bus.clone());

        let session_worker = SessionWorker::new(
            config.clone(),
            Arc::clone(&api),
            command_rx,
            command_tx.downgrade(),
            event_bus.clone(),
            SessionChannels {
                snapshot: snapshot_tx,
                polling: polling_tx,
                character: character_tx,
            },
        );
        let session_worker = tokio::spawn(async move {
            session_worker.run().await;
        });

        let polling_worker =
            PollingWorker::new(api, command_tx.clone(), polling_rx, config.poll_interval);
        let polling_worker = tokio::spawn(async move {
            polling_worker.run().await;
        });

        let push_worker = self.push.map(|transport| {
            let push_worker = PushWorker::new(
                transport,
                command_tx.clone(),
                character_rx,
                event_bus.clone(),
                config.reconnect_interval,
            );
            tokio::spawn(async move {
                push_worker.run().await;
            })
        });

        Ok(CombatRuntime {
            handle,
            session_worker,
            polling_worker,
            push_worker,
        })
    }
}
