//! Transport-agnostic JSON-RPC client: request/reply correlation,
//! handshake, retry supervision, and the circuit breaker all live here,
//! generic over any [`Transport`](crate::transport::Transport).

pub mod circuit_breaker;
pub mod retry;
pub mod stats;

use crate::capability::CapabilitySet;
use crate::jsonrpc::{ErrorObject, InboundMessage, Request};
use crate::transport::{InboundReceiver, Transport};
use crate::{Error, Result};
use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use dashmap::DashMap;
use retry::{RetryConfig, RetrySupervisor};
use serde_json::Value;
use stats::AdapterStats;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, RwLock};

const MCP_PROTOCOL_VERSION: &str = "2024-11-05";
const GATEWAY_CLIENT_NAME: &str = "mcp-gateway";
const GATEWAY_CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(60);

struct InFlightEntry {
    awaiter: oneshot::Sender<Result<Value>>,
    started_at: Instant,
}

/// Everything the base adapter needs to treat a transport generically:
/// request correlation, retry state, breaker, and stats. One per
/// registered backend.
pub struct BaseAdapter<T: Transport> {
    backend_id: String,
    transport: RwLock<T>,
    request_timeout: Duration,
    next_id: AtomicU64,
    in_flight: Arc<DashMap<u64, InFlightEntry>>,
    breaker: Arc<CircuitBreaker>,
    retry: Arc<RetrySupervisor>,
    stats: Arc<AdapterStats>,
    capabilities: RwLock<Option<CapabilitySet>>,
    connected: Arc<AtomicBool>,
    reader_task: RwLock<Option<tokio::task::JoinHandle<()>>>,
}

impl<T: Transport + 'static> BaseAdapter<T> {
    pub fn new(backend_id: String, transport: T, request_timeout: Duration, max_retries: u32) -> Self {
        Self {
            backend_id,
            transport: RwLock::new(transport),
            request_timeout,
            next_id: AtomicU64::new(1),
            in_flight: Arc::new(DashMap::new()),
            breaker: Arc::new(CircuitBreaker::new(CircuitBreakerConfig::default())),
            retry: Arc::new(RetrySupervisor::new(RetryConfig::from_max_retries(max_retries))),
            stats: Arc::new(AdapterStats::new()),
            capabilities: RwLock::new(None),
            connected: Arc::new(AtomicBool::new(false)),
            reader_task: RwLock::new(None),
        }
    }

    pub fn backend_id(&self) -> &str {
        &self.backend_id
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> stats::StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn record_health_transition(&self, from: crate::registry::Health, to: crate::registry::Health) {
        self.stats.record_health_transition(from, to);
    }

    pub async fn breaker_state(&self) -> CircuitState {
        self.breaker.state().await
    }

    pub async fn cached_capabilities(&self) -> Option<CapabilitySet> {
        self.capabilities.read().await.clone()
    }

    /// Start the transport and run the MCP handshake. Idempotent: a second
    /// call while capabilities are already cached is a no-op.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.capabilities.read().await.is_some() {
            return Ok(());
        }

        self.connect_and_handshake().await?;
        self.retry.reset();
        Ok(())
    }

    /// Open the transport, spawn its reader, and run the handshake. Shared
    /// by the initial `start` and by the recovery supervisor's reconnect
    /// attempts; unlike `start`, this always re-runs the wire exchange.
    async fn connect_and_handshake(self: &Arc<Self>) -> Result<()> {
        let (tx, rx) = tokio::sync::mpsc::channel(256);
        self.transport.write().await.start(tx).await?;
        self.connected.store(true, Ordering::SeqCst);

        let reader = self.clone().spawn_reader(rx);
        if let Some(previous) = self.reader_task.write().await.replace(reader) {
            previous.abort();
        }

        tokio::time::timeout(DEFAULT_HANDSHAKE_TIMEOUT, self.handshake())
            .await
            .map_err(|_| Error::HandshakeTimeout(self.backend_id.clone()))??;

        Ok(())
    }

    /// Entered when the transport reports an unexpected exit while the
    /// adapter was healthy. Backs off per [`RetrySupervisor`], cancels
    /// in-flight requests once per cycle, and gives up — leaving the
    /// adapter disconnected for the next health check to notice — after
    /// `max_retries` failed attempts.
    fn begin_recovery(self: Arc<Self>) {
        tokio::spawn(async move {
            loop {
                if self.retry.exhausted() {
                    tracing::warn!(
                        backend = %self.backend_id,
                        "retry attempts exhausted; adapter is terminally unhealthy"
                    );
                    return;
                }

                let delay = self.retry.next_delay();
                tracing::info!(
                    backend = %self.backend_id,
                    attempt = self.retry.attempt_count(),
                    ?delay,
                    "scheduling reconnect attempt"
                );
                tokio::time::sleep(delay).await;

                self.cancel_all_in_flight(Error::TransportLost);
                match self.connect_and_handshake().await {
                    Ok(()) => {
                        tracing::info!(backend = %self.backend_id, "reconnect succeeded");
                        self.retry.reset();
                        return;
                    }
                    Err(e) => {
                        tracing::warn!(backend = %self.backend_id, error = %e, "reconnect attempt failed");
                        self.connected.store(false, Ordering::SeqCst);
                    }
                }
            }
        });
    }

    pub async fn stop(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        self.cancel_all_in_flight(Error::TransportLost);
        self.transport.write().await.stop().await?;
        if let Some(task) = self.reader_task.write().await.take() {
            task.abort();
        }
        Ok(())
    }

    fn cancel_all_in_flight(&self, _reason: Error) {
        let ids: Vec<u64> = self.in_flight.iter().map(|e| *e.key()).collect();
        for id in ids {
            if let Some((_, entry)) = self.in_flight.remove(&id) {
                let _ = entry.awaiter.send(Err(Error::TransportLost));
            }
        }
    }

    fn spawn_reader(self: Arc<Self>, mut rx: InboundReceiver) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                match message {
                    InboundMessage::Response(response) => {
                        self.complete_request(response).await;
                    }
                    InboundMessage::Notification { method, .. } if method == "$/transport/exited" => {
                        let was_connected = self.connected.swap(false, Ordering::SeqCst);
                        self.cancel_all_in_flight(Error::TransportLost);
                        if was_connected {
                            self.clone().begin_recovery();
                        }
                        break;
                    }
                    InboundMessage::Notification { method, .. } => {
                        tracing::debug!(backend = %self.backend_id, %method, "unsolicited notification from backend");
                    }
                }
            }
        })
    }

    async fn complete_request(&self, response: crate::jsonrpc::Response) {
        let Some(id) = response.id.as_u64() else {
            return;
        };
        if let Some((_, entry)) = self.in_flight.remove(&id) {
            let elapsed = entry.started_at.elapsed();
            if let Some(error) = response.error {
                self.stats.record_failure(elapsed);
                self.breaker.record_failure().await;
                let _ = entry.awaiter.send(Err(Error::BackendReported {
                    code: error.code,
                    message: error.message,
                }));
            } else {
                self.stats.record_success(elapsed);
                self.breaker.record_success().await;
                let _ = entry
                    .awaiter
                    .send(Ok(response.result.unwrap_or(Value::Null)));
            }
        }
    }

    /// Send a request and await its reply, subject to the circuit breaker
    /// and the adapter's configured per-request timeout.
    pub async fn send_request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        if !self.breaker.allow_request().await {
            return Err(Error::CircuitOpen(self.backend_id.clone()));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.in_flight.insert(
            id,
            InFlightEntry {
                awaiter: tx,
                started_at: Instant::now(),
            },
        );

        let request = Request::new(Some(Value::from(id)), method, params);
        let payload = serde_json::to_vec(&request)?;

        if let Err(e) = self.transport.read().await.send_raw(&payload).await {
            self.in_flight.remove(&id);
            self.breaker.record_failure().await;
            return Err(e);
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::TransportLost),
            Err(_) => {
                self.in_flight.remove(&id);
                self.stats.record_failure(self.request_timeout);
                self.breaker.record_failure().await;
                Err(Error::RequestTimeout(self.request_timeout))
            }
        }
    }

    pub async fn send_notification(&self, method: &str, params: Option<Value>) -> Result<()> {
        let request = Request::notification(method, params);
        let payload = serde_json::to_vec(&request)?;
        self.transport.read().await.send_raw(&payload).await
    }

    async fn handshake(&self) -> Result<()> {
        let init_result = self
            .send_request(
                "initialize",
                Some(serde_json::json!({
                    "protocolVersion": MCP_PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": { "name": GATEWAY_CLIENT_NAME, "version": GATEWAY_CLIENT_VERSION },
                })),
            )
            .await?;

        self.send_notification("notifications/initialized", None)
            .await?;

        let server_capabilities = init_result.get("capabilities").cloned();
        let server_info = init_result.get("serverInfo").cloned();

        let mut set = CapabilitySet {
            server_info,
            ..Default::default()
        };

        if wants_group(&server_capabilities, "tools") {
            match self.send_request("tools/list", None).await {
                Ok(v) => {
                    set.tools = serde_json::from_value(v.get("tools").cloned().unwrap_or_default())
                        .unwrap_or_default();
                }
                Err(e) => tracing::warn!(backend = %self.backend_id, error = %e, "tools/list failed during handshake"),
            }
        }
        if wants_group(&server_capabilities, "resources") {
            match self.send_request("resources/list", None).await {
                Ok(v) => {
                    set.resources =
                        serde_json::from_value(v.get("resources").cloned().unwrap_or_default())
                            .unwrap_or_default();
                }
                Err(e) => tracing::warn!(backend = %self.backend_id, error = %e, "resources/list failed during handshake"),
            }
        }
        if wants_group(&server_capabilities, "prompts") {
            match self.send_request("prompts/list", None).await {
                Ok(v) => {
                    set.prompts =
                        serde_json::from_value(v.get("prompts").cloned().unwrap_or_default())
                            .unwrap_or_default();
                }
                Err(e) => tracing::warn!(backend = %self.backend_id, error = %e, "prompts/list failed during handshake"),
            }
        }

        *self.capabilities.write().await = Some(set);
        Ok(())
    }
}

/// A server capability descriptor advertises a group either with a present
/// (possibly empty) object, or its absence entirely; we default to "list it
/// anyway" whenever the `capabilities` object itself is missing, matching a
/// lenient backend that never sent one.
fn wants_group(capabilities: &Option<Value>, group: &str) -> bool {
    match capabilities {
        None => true,
        Some(Value::Object(map)) => map.contains_key(group),
        Some(_) => true,
    }
}

impl From<ErrorObject> for Error {
    fn from(value: ErrorObject) -> Self {
        Error::BackendReported {
            code: value.code,
            message: value.message,
        }
    }
}

/// Object-safe facade over `BaseAdapter<T>` so the registry can hold
/// stdio-backed and event-stream-backed adapters side by side in one map.
#[async_trait::async_trait]
pub trait DynAdapter: Send + Sync {
    fn backend_id(&self) -> &str;
    fn is_connected(&self) -> bool;
    async fn start(&self) -> Result<()>;
    async fn stop(&self) -> Result<()>;
    async fn send_request(&self, method: &str, params: Option<Value>) -> Result<Value>;
    async fn cached_capabilities(&self) -> Option<CapabilitySet>;
    async fn breaker_state(&self) -> CircuitState;
    fn stats(&self) -> stats::StatsSnapshot;
    fn record_health_transition(&self, from: crate::registry::Health, to: crate::registry::Health);
}

#[async_trait::async_trait]
impl<T: Transport + 'static> DynAdapter for Arc<BaseAdapter<T>> {
    fn backend_id(&self) -> &str {
        BaseAdapter::backend_id(self)
    }

    fn is_connected(&self) -> bool {
        BaseAdapter::is_connected(self)
    }

    async fn start(&self) -> Result<()> {
        BaseAdapter::start(self).await
    }

    async fn stop(&self) -> Result<()> {
        BaseAdapter::stop(self).await
    }

    async fn send_request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        BaseAdapter::send_request(self, method, params).await
    }

    async fn cached_capabilities(&self) -> Option<CapabilitySet> {
        BaseAdapter::cached_capabilities(self).await
    }

    async fn breaker_state(&self) -> CircuitState {
        BaseAdapter::breaker_state(self).await
    }

    fn stats(&self) -> stats::StatsSnapshot {
        BaseAdapter::stats(self)
    }

    fn record_health_transition(&self, from: crate::registry::Health, to: crate::registry::Health) {
        BaseAdapter::record_health_transition(self, from, to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jsonrpc::{parse_inbound, Response};
    use crate::transport::InboundSender;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    /// An in-memory transport for adapter tests: `send_raw` decodes the
    /// outgoing request and, if it matches a scripted response, feeds that
    /// response straight back through the inbound channel.
    struct ScriptedTransport {
        inbound: Mutex<Option<InboundSender>>,
        responder: Arc<dyn Fn(Value) -> Option<Value> + Send + Sync>,
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn start(&mut self, inbound: InboundSender) -> Result<()> {
            *self.inbound.lock().unwrap() = Some(inbound);
            Ok(())
        }

        async fn stop(&mut self) -> Result<()> {
            Ok(())
        }

        fn is_connected(&self) -> bool {
            true
        }

        async fn send_raw(&self, message: &[u8]) -> Result<()> {
            let request: Value = serde_json::from_slice(message).unwrap();
            if let Some(result) = (self.responder)(request.clone()) {
                let id = request.get("id").cloned().unwrap_or(Value::Null);
                let response = Response::success(id, result);
                let raw = serde_json::to_string(&response).unwrap();
                let inbound = self.inbound.lock().unwrap().clone().unwrap();
                let parsed = parse_inbound(&raw).unwrap();
                let _ = inbound.send(parsed).await;
            }
            Ok(())
        }
    }

    fn handshake_responder(request: Value) -> Option<Value> {
        match request.get("method").and_then(Value::as_str) {
            Some("initialize") => Some(serde_json::json!({
                "capabilities": {"tools": {}},
                "serverInfo": {"name": "fake"},
            })),
            Some("tools/list") => Some(serde_json::json!({"tools": []})),
            _ => None,
        }
    }

    #[tokio::test]
    async fn start_runs_handshake_and_caches_capabilities() {
        let transport = ScriptedTransport {
            inbound: Mutex::new(None),
            responder: Arc::new(handshake_responder),
        };
        let adapter = Arc::new(BaseAdapter::new(
            "svc".to_string(),
            transport,
            Duration::from_secs(5),
            3,
        ));
        adapter.start().await.unwrap();
        assert!(adapter.cached_capabilities().await.is_some());
    }

    #[tokio::test]
    async fn second_start_is_idempotent_noop() {
        let transport = ScriptedTransport {
            inbound: Mutex::new(None),
            responder: Arc::new(handshake_responder),
        };
        let adapter = Arc::new(BaseAdapter::new(
            "svc".to_string(),
            transport,
            Duration::from_secs(5),
            3,
        ));
        adapter.start().await.unwrap();
        adapter.start().await.unwrap();
    }

    #[tokio::test]
    async fn request_timeout_surfaces_and_records_failure() {
        let transport = ScriptedTransport {
            inbound: Mutex::new(None),
            responder: Arc::new(|_| None),
        };
        let adapter = Arc::new(BaseAdapter::new(
            "svc".to_string(),
            transport,
            Duration::from_millis(20),
            3,
        ));
        let (tx, _rx) = mpsc::channel(8);
        adapter.transport.write().await.start(tx).await.unwrap();
        let result = adapter.send_request("ping", None).await;
        assert!(matches!(result, Err(Error::RequestTimeout(_))));
        assert_eq!(adapter.stats().total_errors, 1);
    }

    /// A transport whose `start` always succeeds, counts how many times it
    /// was called, and responds to the handshake. Used to exercise the
    /// recovery supervisor's reconnect path.
    struct RestartCountingTransport {
        inbound: Mutex<Option<InboundSender>>,
        start_count: Arc<AtomicU64>,
    }

    #[async_trait]
    impl Transport for RestartCountingTransport {
        async fn start(&mut self, inbound: InboundSender) -> Result<()> {
            self.start_count.fetch_add(1, Ordering::SeqCst);
            *self.inbound.lock().unwrap() = Some(inbound);
            Ok(())
        }

        async fn stop(&mut self) -> Result<()> {
            Ok(())
        }

        fn is_connected(&self) -> bool {
            true
        }

        async fn send_raw(&self, message: &[u8]) -> Result<()> {
            let request: Value = serde_json::from_slice(message).unwrap();
            if let Some(result) = handshake_responder(request.clone()) {
                let id = request.get("id").cloned().unwrap_or(Value::Null);
                let response = Response::success(id, result);
                let raw = serde_json::to_string(&response).unwrap();
                let inbound = self.inbound.lock().unwrap().clone().unwrap();
                let parsed = parse_inbound(&raw).unwrap();
                let _ = inbound.send(parsed).await;
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn unexpected_exit_while_healthy_triggers_reconnect() {
        let start_count = Arc::new(AtomicU64::new(0));
        let transport = RestartCountingTransport {
            inbound: Mutex::new(None),
            start_count: start_count.clone(),
        };
        let adapter = Arc::new(BaseAdapter::new(
            "svc".to_string(),
            transport,
            Duration::from_secs(5),
            3,
        ));
        adapter.start().await.unwrap();
        assert_eq!(start_count.load(Ordering::SeqCst), 1);

        let inbound = adapter
            .transport
            .read()
            .await
            .inbound
            .lock()
            .unwrap()
            .clone()
            .unwrap();
        inbound
            .send(InboundMessage::Notification {
                method: "$/transport/exited".to_string(),
                params: None,
            })
            .await
            .unwrap();

        // Backoff's first attempt fires at ~1s base delay; give it generous
        // headroom so the test isn't flaky under load.
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(start_count.load(Ordering::SeqCst) >= 2);
        assert_eq!(adapter.retry.attempt_count(), 0, "successful reconnect resets the counter");
    }
}
