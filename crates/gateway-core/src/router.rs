//! Namespace encode/decode and request forwarding: turns a namespaced
//! tool/resource/prompt key into a (backend id, original key) pair and
//! drives the call through the registry.

use crate::error::code;
use crate::registry::{Health, Registry};
use crate::{Error, Result};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

const NAME_SEPARATOR: &str = "__";

fn uri_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^([A-Za-z][A-Za-z0-9_-]*)://(.+)$").unwrap())
}

pub fn encode_name(backend_id: &str, name: &str) -> String {
    format!("{backend_id}{NAME_SEPARATOR}{name}")
}

pub fn encode_uri(backend_id: &str, uri: &str) -> String {
    format!("{backend_id}://{uri}")
}

/// Decode a namespaced tool/prompt name. Both halves must be non-empty.
pub fn decode_name(namespaced: &str) -> Result<(String, String)> {
    match namespaced.split_once(NAME_SEPARATOR) {
        Some((backend_id, name)) if !backend_id.is_empty() && !name.is_empty() => {
            Ok((backend_id.to_string(), name.to_string()))
        }
        _ => Err(Error::Unparseable(namespaced.to_string())),
    }
}

/// Decode a namespaced resource URI. Only the outermost
/// `<backendId>://` prefix is ever stripped; anything after it, including
/// another `scheme://`, is returned untouched.
pub fn decode_uri(namespaced: &str) -> Result<(String, String)> {
    let captures = uri_pattern()
        .captures(namespaced)
        .ok_or_else(|| Error::Unparseable(namespaced.to_string()))?;
    let backend_id = captures.get(1).unwrap().as_str().to_string();
    let rest = captures.get(2).unwrap().as_str().to_string();
    if backend_id.is_empty() || rest.is_empty() {
        return Err(Error::Unparseable(namespaced.to_string()));
    }
    Ok((backend_id, rest))
}

pub struct Router<'a> {
    registry: &'a Registry,
}

impl<'a> Router<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Self { registry }
    }

    async fn forward(&self, backend_id: &str, method: &str, params: Option<Value>) -> Result<Value> {
        let adapter = self.registry.get_adapter_ensure_started(backend_id).await?;
        if self.registry.health_of(backend_id).await != Some(Health::Healthy) {
            return Err(Error::ServerNotHealthy(backend_id.to_string()));
        }
        adapter.send_request(method, params).await
    }

    pub async fn route_tool_call(&self, namespaced_name: &str, arguments: Option<Value>) -> Result<Value> {
        let (backend_id, name) = decode_name(namespaced_name)?;
        self.forward(
            &backend_id,
            "tools/call",
            Some(serde_json::json!({ "name": name, "arguments": arguments.unwrap_or(Value::Null) })),
        )
        .await
    }

    pub async fn route_resource_read(&self, namespaced_uri: &str) -> Result<Value> {
        let (backend_id, uri) = decode_uri(namespaced_uri)?;
        self.forward(&backend_id, "resources/read", Some(serde_json::json!({ "uri": uri })))
            .await
    }

    pub async fn route_prompt_get(&self, namespaced_name: &str, arguments: Option<Value>) -> Result<Value> {
        let (backend_id, name) = decode_name(namespaced_name)?;
        self.forward(
            &backend_id,
            "prompts/get",
            Some(serde_json::json!({ "name": name, "arguments": arguments.unwrap_or(Value::Null) })),
        )
        .await
    }
}

/// Map a routing failure to the JSON-RPC error code the facade should put
/// on the wire. `ServerNotHealthy`/`UnknownBackend`/`Unparseable` are all
/// surfaced as backend-unavailable per the design's error taxonomy.
pub fn routing_error_code(error: &Error) -> i64 {
    match error {
        Error::ServerNotHealthy(_) | Error::UnknownBackend(_) | Error::Unparseable(_) => {
            code::BACKEND_UNAVAILABLE
        }
        other => other.jsonrpc_code(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_and_decodes_names_round_trip() {
        let encoded = encode_name("svc", "do_thing");
        assert_eq!(encoded, "svc__do_thing");
        assert_eq!(decode_name(&encoded).unwrap(), ("svc".to_string(), "do_thing".to_string()));
    }

    #[test]
    fn decode_name_requires_non_empty_halves() {
        assert!(decode_name("__name").is_err());
        assert!(decode_name("svc__").is_err());
        assert!(decode_name("no-separator").is_err());
    }

    #[test]
    fn encodes_and_decodes_uris_round_trip() {
        let encoded = encode_uri("svc", "file:///etc/passwd");
        assert_eq!(encoded, "svc://file:///etc/passwd");
        let (backend_id, rest) = decode_uri(&encoded).unwrap();
        assert_eq!(backend_id, "svc");
        assert_eq!(rest, "file:///etc/passwd");
    }

    #[test]
    fn decode_uri_only_strips_outermost_prefix() {
        let (backend_id, rest) = decode_uri("svc://custom://nested/path").unwrap();
        assert_eq!(backend_id, "svc");
        assert_eq!(rest, "custom://nested/path");
    }

    #[test]
    fn decode_uri_rejects_malformed_input() {
        assert!(decode_uri("not-a-uri").is_err());
        assert!(decode_uri("://missing-backend").is_err());
        assert!(decode_uri("svc://").is_err());
    }
}
