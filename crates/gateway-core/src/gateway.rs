//! The gateway facade: dispatches inbound JSON-RPC requests to the
//! registry/router, maintains client sessions, and fans replies out to
//! any SSE stream that session is attached to.

use crate::error::code;
use crate::jsonrpc::{ErrorObject, Response};
use crate::registry::Registry;
use crate::router::{routing_error_code, Router};
use crate::session::SessionManager;
use crate::sse_stream::StreamHub;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

const GATEWAY_NAME: &str = "mcp-gateway";
const GATEWAY_VERSION: &str = env!("CARGO_PKG_VERSION");

pub struct Gateway {
    registry: Arc<Registry>,
    sessions: Arc<SessionManager>,
    streams: Arc<StreamHub>,
}

impl Gateway {
    pub fn new(registry: Arc<Registry>, sessions: Arc<SessionManager>, streams: Arc<StreamHub>) -> Self {
        Self {
            registry,
            sessions,
            streams,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn streams(&self) -> &Arc<StreamHub> {
        &self.streams
    }

    /// Handle one inbound JSON-RPC payload, optionally bound to a client
    /// session. `id` is preserved exactly as received, including absence
    /// (echoed back as `null` rather than coerced to `0`).
    pub async fn handle(&self, id: Option<Value>, method: &str, params: Option<Value>, session_id: Option<Uuid>) -> Response {
        if let Some(session_id) = session_id {
            self.sessions.touch(session_id);
        }

        let reply_id = id.unwrap_or(Value::Null);
        let result = self.dispatch(method, params).await;

        let response = match result {
            Ok(value) => Response::success(reply_id.clone(), value),
            Err(error) => Response::failure(reply_id.clone(), error),
        };

        if let Some(session_id) = session_id {
            let payload = serde_json::to_value(&response).unwrap_or(Value::Null);
            self.streams.send_to_session(session_id, payload);
        }

        response
    }

    async fn dispatch(&self, method: &str, params: Option<Value>) -> Result<Value, ErrorObject> {
        match method {
            "initialize" => Ok(self.handle_initialize().await),
            "ping" => Ok(serde_json::json!({})),
            "tools/list" => self.handle_tools_list().await,
            "tools/call" => self.handle_tools_call(params).await,
            "resources/list" => self.handle_resources_list().await,
            "resources/read" => self.handle_resources_read(params).await,
            "resources/templates/list" => Ok(serde_json::json!({ "resourceTemplates": [] })),
            "prompts/list" => self.handle_prompts_list().await,
            "prompts/get" => self.handle_prompts_get(params).await,
            "notifications/initialized" | "notifications/cancelled" => Ok(serde_json::json!({})),
            other => Err(ErrorObject::new(
                code::METHOD_NOT_FOUND,
                format!("method not found: {other}"),
            )),
        }
    }

    async fn handle_initialize(&self) -> Value {
        let (tools, resources, prompts) = self.registry.get_merged_capabilities().await;
        let mut capabilities = serde_json::Map::new();
        if !tools.is_empty() {
            capabilities.insert("tools".to_string(), serde_json::json!({}));
        }
        if !resources.is_empty() {
            capabilities.insert("resources".to_string(), serde_json::json!({}));
        }
        if !prompts.is_empty() {
            capabilities.insert("prompts".to_string(), serde_json::json!({}));
        }

        let mut backend_ids: Vec<String> =
            tools.iter().map(|o| o.backend_id.clone())
                .chain(resources.iter().map(|o| o.backend_id.clone()))
                .chain(prompts.iter().map(|o| o.backend_id.clone()))
                .collect();
        backend_ids.sort();
        backend_ids.dedup();

        let instructions = format!(
            "This gateway federates backends {backend_ids:?}. Tool/prompt names are namespaced as \
             '<backendId>__<name>'; resource URIs as '<backendId>://<original>'."
        );

        serde_json::json!({
            "protocolVersion": "2024-11-05",
            "capabilities": capabilities,
            "serverInfo": { "name": GATEWAY_NAME, "version": GATEWAY_VERSION },
            "instructions": instructions,
        })
    }

    async fn handle_tools_list(&self) -> Result<Value, ErrorObject> {
        let (tools, _, _) = self.registry.get_merged_capabilities().await;
        let namespaced: Vec<Value> = tools
            .into_iter()
            .map(|origin| {
                let mut tool = origin.item;
                tool.name = crate::router::encode_name(&origin.backend_id, &tool.name);
                serde_json::to_value(tool).unwrap_or(Value::Null)
            })
            .collect();
        Ok(serde_json::json!({ "tools": namespaced }))
    }

    async fn handle_resources_list(&self) -> Result<Value, ErrorObject> {
        let (_, resources, _) = self.registry.get_merged_capabilities().await;
        let namespaced: Vec<Value> = resources
            .into_iter()
            .map(|origin| {
                let mut resource = origin.item;
                resource.uri = crate::router::encode_uri(&origin.backend_id, &resource.uri);
                serde_json::to_value(resource).unwrap_or(Value::Null)
            })
            .collect();
        Ok(serde_json::json!({ "resources": namespaced }))
    }

    async fn handle_prompts_list(&self) -> Result<Value, ErrorObject> {
        let (_, _, prompts) = self.registry.get_merged_capabilities().await;
        let namespaced: Vec<Value> = prompts
            .into_iter()
            .map(|origin| {
                let mut prompt = origin.item;
                prompt.name = crate::router::encode_name(&origin.backend_id, &prompt.name);
                serde_json::to_value(prompt).unwrap_or(Value::Null)
            })
            .collect();
        Ok(serde_json::json!({ "prompts": namespaced }))
    }

    async fn handle_tools_call(&self, params: Option<Value>) -> Result<Value, ErrorObject> {
        let params = params.ok_or_else(|| missing_param("params"))?;
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| missing_param("name"))?;
        let arguments = params.get("arguments").cloned();

        let router = Router::new(&self.registry);
        match router.route_tool_call(name, arguments).await {
            Ok(value) => Ok(value),
            Err(error) => Err(self.route_error(error).await),
        }
    }

    async fn handle_resources_read(&self, params: Option<Value>) -> Result<Value, ErrorObject> {
        let params = params.ok_or_else(|| missing_param("params"))?;
        let uri = params
            .get("uri")
            .and_then(Value::as_str)
            .ok_or_else(|| missing_param("uri"))?;

        let router = Router::new(&self.registry);
        match router.route_resource_read(uri).await {
            Ok(value) => Ok(value),
            Err(error) => Err(self.route_error(error).await),
        }
    }

    async fn handle_prompts_get(&self, params: Option<Value>) -> Result<Value, ErrorObject> {
        let params = params.ok_or_else(|| missing_param("params"))?;
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| missing_param("name"))?;
        let arguments = params.get("arguments").cloned();

        let router = Router::new(&self.registry);
        match router.route_prompt_get(name, arguments).await {
            Ok(value) => Ok(value),
            Err(error) => Err(self.route_error(error).await),
        }
    }

    /// Maps a routing failure to its JSON-RPC error object. Circuit-open
    /// failures additionally carry the breaker's current state in `data`,
    /// so a caller can tell "this backend is down" from "this backend is
    /// tripped and will retry on its own".
    async fn route_error(&self, error: crate::Error) -> ErrorObject {
        let code = routing_error_code(&error);
        let object = ErrorObject::new(code, error.to_string());

        if let crate::Error::CircuitOpen(backend_id) = &error {
            let breaker_state = self.registry.breaker_state_of(backend_id).await;
            return object.with_data(serde_json::json!({
                "reason": "circuit_open",
                "backendId": backend_id,
                "breakerState": breaker_state.map(|s| format!("{s:?}")),
            }));
        }

        object
    }
}

fn missing_param(field: &str) -> ErrorObject {
    ErrorObject::new(code::INVALID_PARAMS, format!("missing required parameter '{field}'"))
}
