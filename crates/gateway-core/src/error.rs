use thiserror::Error;

/// Errors raised by the federation core. Each variant maps to one of the
/// error kinds in the design: configuration, transport, protocol, timeout,
/// backend-reported, or policy.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration rejected: {0}")]
    Configuration(String),

    #[error("spawn failed for backend '{backend}': {source}")]
    SpawnFailed {
        backend: String,
        #[source]
        source: std::io::Error,
    },

    #[error("transport error for backend '{backend}': {message}")]
    Transport { backend: String, message: String },

    #[error("handshake timed out for backend '{0}'")]
    HandshakeTimeout(String),

    #[error("backend '{0}' process exited unexpectedly")]
    ProcessExited(String),

    #[error("malformed JSON-RPC message: {0}")]
    Protocol(String),

    #[error("request timed out after {0:?}")]
    RequestTimeout(std::time::Duration),

    #[error("transport lost, pending request cancelled")]
    TransportLost,

    #[error("backend returned error {code}: {message}")]
    BackendReported { code: i64, message: String },

    #[error("circuit open for backend '{0}'")]
    CircuitOpen(String),

    #[error("backend '{0}' is not healthy")]
    ServerNotHealthy(String),

    #[error("unknown backend '{0}'")]
    UnknownBackend(String),

    #[error("'{0}' does not parse as a namespaced identifier")]
    Unparseable(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// JSON-RPC error codes the gateway can emit, per the wire protocol section
/// of the design document.
pub mod code {
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
    pub const BACKEND_UNAVAILABLE: i64 = -32000;
}

impl Error {
    /// Map an internal error to the JSON-RPC error code the gateway facade
    /// should put on the wire. Backend-reported errors are not covered here —
    /// those are relayed verbatim by the caller, not through this mapping.
    pub fn jsonrpc_code(&self) -> i64 {
        match self {
            Error::ServerNotHealthy(_) | Error::UnknownBackend(_) | Error::Unparseable(_) => {
                code::BACKEND_UNAVAILABLE
            }
            Error::CircuitOpen(_) => code::INTERNAL_ERROR,
            Error::Protocol(_) => code::INVALID_REQUEST,
            _ => code::INTERNAL_ERROR,
        }
    }
}
