//! Federation core for the MCP gateway: transport-agnostic adapters over
//! child-process and event-stream backends, a registry that merges their
//! capabilities, a namespacing router, and the facade that serves the
//! combined catalog as one MCP endpoint.

pub mod adapter;
pub mod capability;
pub mod error;
pub mod gateway;
pub mod jsonrpc;
pub mod registry;
pub mod router;
pub mod session;
pub mod sse_stream;
pub mod transport;

pub use error::{Error, Result};
pub use gateway::Gateway;
pub use registry::Registry;
pub use session::SessionManager;
pub use sse_stream::StreamHub;
