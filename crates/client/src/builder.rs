//! Client builder with dependency injection pattern.

use std::sync::Arc;

use anyhow::{Context, Result};

use client_transport::{HttpCombatApi, PusherTransport};
use combat_runtime::{CombatApi, CombatRuntime, PushTransport, RuntimeConfig};

use crate::{Client, ClientConfig, SessionPlan};

/// Builder for constructing a [`Client`].
///
/// The request/response API is required; the push transport is optional
/// and polling alone keeps the session running without it.
#[derive(Default)]
pub struct ClientBuilder {
    runtime: RuntimeConfig,
    api: Option<Arc<dyn CombatApi>>,
    push: Option<Arc<dyn PushTransport>>,
    plan: SessionPlan,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Network transports and settings from a loaded [`ClientConfig`].
    pub fn from_config(config: ClientConfig) -> Result<Self> {
        let api = HttpCombatApi::new(config.transport.clone())
            .context("failed to build HTTP client")?;
        let mut builder = Self::new()
            .runtime_config(config.runtime)
            .api(api)
            .plan(config.session);
        if config.enable_push {
            builder = builder.push(PusherTransport::new(config.transport));
        }
        Ok(builder)
    }

    pub fn runtime_config(mut self, config: RuntimeConfig) -> Self {
        self.runtime = config;
        self
    }

    /// Set the combat API (required).
    pub fn api(mut self, api: impl CombatApi + 'static) -> Self {
        self.api = Some(Arc::new(api));
        self
    }

    /// Set the push transport (optional).
    pub fn push(mut self, push: impl PushTransport + 'static) -> Self {
        self.push = Some(Arc::new(push));
        self
    }

    pub fn plan(mut self, plan: SessionPlan) -> Self {
        self.plan = plan;
        self
    }

    /// Build the client and spawn the runtime workers.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> Result<Client> {
        let api = self
            .api
            .context("Combat API is required. Use .api() to set it.")?;

        let mut runtime = CombatRuntime::builder()
            .config(self.runtime)
            .api_arc(Arc::clone(&api));
        if let Some(push) = self.push {
            runtime = runtime.push_transport_arc(push);
        }
        let runtime = runtime.build().context("failed to build combat runtime")?;

        Ok(Client {
            runtime,
            api,
            plan: self.plan,
        })
    }
}
