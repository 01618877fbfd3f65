//! Capability records as reported by a backend, and their namespaced,
//! origin-annotated counterparts as presented to clients.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Tool {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "default_schema", rename = "inputSchema")]
    pub input_schema: Value,
}

fn default_schema() -> Value {
    serde_json::json!({"type": "object"})
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Resource {
    pub uri: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "mimeType")]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PromptArgument {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Prompt {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub arguments: Vec<PromptArgument>,
}

/// The raw capability snapshot a handshake caches for one backend.
#[derive(Debug, Clone, Default)]
pub struct CapabilitySet {
    pub tools: Vec<Tool>,
    pub resources: Vec<Resource>,
    pub prompts: Vec<Prompt>,
    pub server_info: Option<Value>,
}

/// A capability entry annotated with its origin backend and its
/// pre-namespacing original key, as produced by the registry's merge and
/// consumed by the router.
#[derive(Debug, Clone)]
pub struct Origin<T> {
    pub backend_id: String,
    pub original_key: String,
    pub item: T,
}

impl<T> Origin<T> {
    pub fn new(backend_id: impl Into<String>, original_key: impl Into<String>, item: T) -> Self {
        Self {
            backend_id: backend_id.into(),
            original_key: original_key.into(),
            item,
        }
    }
}
