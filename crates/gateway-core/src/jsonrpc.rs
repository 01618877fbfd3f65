//! The JSON-RPC 2.0 envelope. Only the fields the gateway actually inspects
//! (`jsonrpc`, `id`, `method`, `error.code/message/data`) are structured;
//! `params`/`result` stay opaque [`serde_json::Value`] blobs all the way
//! through the adapter and router.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

/// An inbound or outbound request/notification. `id` is `None` for
/// notifications and for inbound requests that omitted it; the gateway
/// preserves that absence rather than coercing it to `0` (see DESIGN.md).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    pub fn new(id: Option<Value>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
        }
    }

    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self::new(None, method, params)
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorObject {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// A reply. Exactly one of `result`/`error` is present, matching JSON-RPC 2.0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
}

impl Response {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, error: ErrorObject) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// A message read off a backend transport: either a reply to one of our
/// outstanding requests, or an unsolicited notification from the backend.
#[derive(Debug, Clone)]
pub enum InboundMessage {
    Response(Response),
    Notification { method: String, params: Option<Value> },
}

/// Parse a single framed line of backend traffic into a typed inbound
/// message. A payload with an `id` is a response; one with `method` and no
/// `id` is a notification; anything else is a protocol error.
pub fn parse_inbound(raw: &str) -> crate::Result<InboundMessage> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| crate::Error::Protocol(format!("invalid JSON: {e}")))?;

    if value.get("id").is_some() && (value.get("result").is_some() || value.get("error").is_some())
    {
        let response: Response = serde_json::from_value(value)
            .map_err(|e| crate::Error::Protocol(format!("invalid response envelope: {e}")))?;
        return Ok(InboundMessage::Response(response));
    }

    if let Some(method) = value.get("method").and_then(Value::as_str) {
        return Ok(InboundMessage::Notification {
            method: method.to_string(),
            params: value.get("params").cloned(),
        });
    }

    Err(crate::Error::Protocol(
        "message has neither a result/error id nor a method".to_string(),
    ))
}
