//! Owns the set of registered backend adapters: construction, lazy-start,
//! capability merge, periodic health probing, and coordinated shutdown.

use crate::adapter::stats::StatsSnapshot;
use crate::adapter::{BaseAdapter, DynAdapter};
use crate::capability::{CapabilitySet, Origin};
use crate::transport::sse::EventStreamTransport;
use crate::transport::stdio::StdioTransport;
use crate::{Error, Result};
use dashmap::DashMap;
use gateway_config::{BackendConfig, TransportConfig};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    Stopped,
    Starting,
    Healthy,
    Unhealthy,
}

struct AdapterEntry {
    adapter: Arc<dyn DynAdapter>,
    health: RwLock<Health>,
    lazy_start: bool,
}

/// Diagnostic snapshot of one backend, for an admin surface owned elsewhere.
#[derive(Debug, Clone)]
pub struct BackendDiagnostics {
    pub backend_id: String,
    pub health: Health,
    pub breaker_state: crate::adapter::circuit_breaker::CircuitState,
    pub stats: StatsSnapshot,
}

pub struct Registry {
    adapters: DashMap<String, Arc<AdapterEntry>>,
    registration_order: RwLock<Vec<String>>,
    health_check_task: RwLock<Option<tokio::task::JoinHandle<()>>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            adapters: DashMap::new(),
            registration_order: RwLock::new(Vec::new()),
            health_check_task: RwLock::new(None),
        }
    }

    /// Build the adapter appropriate to the backend's transport, insert it
    /// into the map, and — unless lazy-start is requested — attempt a
    /// synchronous start. A failed eager start is logged, not fatal: the
    /// adapter stays registered and unhealthy.
    pub async fn register_server(&self, config: &BackendConfig) -> Result<()> {
        if self.adapters.contains_key(&config.id) {
            return Err(Error::Configuration(format!(
                "backend '{}' already registered",
                config.id
            )));
        }

        let adapter: Arc<dyn DynAdapter> = match &config.transport {
            TransportConfig::ChildProcess { command, args, env } => {
                let transport = StdioTransport::new(command.clone(), args.clone(), env.clone());
                let base = Arc::new(BaseAdapter::new(
                    config.id.clone(),
                    transport,
                    config.request_timeout(),
                    config.max_retries,
                ));
                Arc::new(base)
            }
            TransportConfig::EventStream { url, token } => {
                let transport = EventStreamTransport::new(url.clone(), token.clone());
                let base = Arc::new(BaseAdapter::new(
                    config.id.clone(),
                    transport,
                    config.request_timeout(),
                    config.max_retries,
                ));
                Arc::new(base)
            }
        };

        let entry = Arc::new(AdapterEntry {
            adapter,
            health: RwLock::new(Health::Stopped),
            lazy_start: config.lazy_start,
        });

        self.adapters.insert(config.id.clone(), entry.clone());
        self.registration_order.write().await.push(config.id.clone());

        if !config.lazy_start {
            *entry.health.write().await = Health::Starting;
            match entry.adapter.start().await {
                Ok(()) => *entry.health.write().await = Health::Healthy,
                Err(e) => {
                    tracing::warn!(backend = %config.id, error = %e, "eager start failed; backend registered unhealthy");
                    *entry.health.write().await = Health::Unhealthy;
                }
            }
        }

        Ok(())
    }

    pub async fn unregister_server(&self, backend_id: &str) -> Result<()> {
        if let Some((_, entry)) = self.adapters.remove(backend_id) {
            entry.adapter.stop().await?;
            self.registration_order
                .write()
                .await
                .retain(|id| id != backend_id);
        }
        Ok(())
    }

    /// The lazy-start hot path: start the adapter on first use if it isn't
    /// connected yet, then hand back the handle.
    pub async fn get_adapter_ensure_started(&self, backend_id: &str) -> Result<Arc<dyn DynAdapter>> {
        let entry = self
            .adapters
            .get(backend_id)
            .map(|e| e.value().clone())
            .ok_or_else(|| Error::UnknownBackend(backend_id.to_string()))?;

        if !entry.adapter.is_connected() {
            *entry.health.write().await = Health::Starting;
            entry.adapter.start().await.map_err(|e| {
                tracing::warn!(backend = %backend_id, error = %e, "lazy start failed");
                e
            })?;
            *entry.health.write().await = Health::Healthy;
        }

        Ok(entry.adapter.clone())
    }

    pub async fn health_of(&self, backend_id: &str) -> Option<Health> {
        match self.adapters.get(backend_id) {
            Some(entry) => Some(*entry.health.read().await),
            None => None,
        }
    }

    pub async fn breaker_state_of(&self, backend_id: &str) -> Option<crate::adapter::circuit_breaker::CircuitState> {
        let entry = self.adapters.get(backend_id)?.value().clone();
        Some(entry.adapter.breaker_state().await)
    }

    /// Tools/resources/prompts from every *healthy* adapter, in stable
    /// registration order, each annotated with its origin backend.
    pub async fn get_merged_capabilities(
        &self,
    ) -> (
        Vec<Origin<crate::capability::Tool>>,
        Vec<Origin<crate::capability::Resource>>,
        Vec<Origin<crate::capability::Prompt>>,
    ) {
        let mut tools = Vec::new();
        let mut resources = Vec::new();
        let mut prompts = Vec::new();

        let order = self.registration_order.read().await.clone();
        for backend_id in order {
            let Some(entry) = self.adapters.get(&backend_id) else {
                continue;
            };
            if *entry.health.read().await != Health::Healthy {
                continue;
            }
            let Some(capabilities) = entry.adapter.cached_capabilities().await else {
                continue;
            };
            extend_from_capabilities(&backend_id, &capabilities, &mut tools, &mut resources, &mut prompts);
        }

        (tools, resources, prompts)
    }

    /// Install a periodic probe: for each non-stopped adapter, ping it and
    /// flip cached health to unhealthy on any failure, recording the
    /// transition.
    pub async fn start_health_checks(self: &Arc<Self>, interval: std::time::Duration) {
        let registry = self.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                registry.run_health_check_pass().await;
            }
        });
        *self.health_check_task.write().await = Some(task);
    }

    async fn run_health_check_pass(&self) {
        let entries: Vec<(String, Arc<AdapterEntry>)> = self
            .adapters
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();

        for (backend_id, entry) in entries {
            let before = *entry.health.read().await;
            if before == Health::Stopped {
                continue;
            }

            let probe_ok = entry.adapter.is_connected()
                && entry.adapter.send_request("ping", None).await.is_ok();

            let after = if probe_ok { Health::Healthy } else { Health::Unhealthy };
            if after != before {
                *entry.health.write().await = after;
                entry.adapter.record_health_transition(before, after);
                tracing::info!(backend = %backend_id, ?before, ?after, "health-changed");
            }
        }
    }

    pub async fn diagnostics(&self) -> Vec<BackendDiagnostics> {
        let entries: Vec<Arc<AdapterEntry>> = self.adapters.iter().map(|e| e.value().clone()).collect();
        let mut snapshots = Vec::with_capacity(entries.len());
        for entry in entries {
            let health = entry
                .health
                .try_read()
                .map(|h| *h)
                .unwrap_or(Health::Starting);
            snapshots.push(BackendDiagnostics {
                backend_id: entry.adapter.backend_id().to_string(),
                health,
                breaker_state: entry.adapter.breaker_state().await,
                stats: entry.adapter.stats(),
            });
        }
        snapshots
    }

    pub async fn shutdown(&self) {
        let entries: Vec<Arc<AdapterEntry>> = self.adapters.iter().map(|e| e.value().clone()).collect();
        let stops = entries
            .iter()
            .map(|entry| entry.adapter.stop())
            .collect::<Vec<_>>();
        futures::future::join_all(stops).await;

        if let Some(task) = self.health_check_task.write().await.take() {
            task.abort();
        }
        self.adapters.clear();
        self.registration_order.write().await.clear();
    }
}

fn extend_from_capabilities(
    backend_id: &str,
    capabilities: &CapabilitySet,
    tools: &mut Vec<Origin<crate::capability::Tool>>,
    resources: &mut Vec<Origin<crate::capability::Resource>>,
    prompts: &mut Vec<Origin<crate::capability::Prompt>>,
) {
    for tool in &capabilities.tools {
        tools.push(Origin::new(backend_id, tool.name.clone(), tool.clone()));
    }
    for resource in &capabilities.resources {
        resources.push(Origin::new(backend_id, resource.uri.clone(), resource.clone()));
    }
    for prompt in &capabilities.prompts {
        prompts.push(Origin::new(backend_id, prompt.name.clone(), prompt.clone()));
    }
}
