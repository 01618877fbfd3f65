//! The transport capability the base adapter depends on: four methods,
//! no more. `stdio` and `sse` are the two concrete implementations; tests
//! add a third, in-memory one.

pub mod sse;
pub mod stdio;

use crate::jsonrpc::InboundMessage;
use crate::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Channel a transport uses to hand decoded inbound messages to the base
/// adapter. Bounded, to apply backpressure if the adapter falls behind.
pub type InboundSender = mpsc::Sender<InboundMessage>;
pub type InboundReceiver = mpsc::Receiver<InboundMessage>;

/// The four primitives a JSON-RPC transport must provide. `BaseAdapter` is
/// generic over this trait and contains no transport-specific code itself.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Start the transport, spawning whatever background tasks it needs and
    /// wiring them to deliver inbound messages on `inbound`.
    async fn start(&mut self, inbound: InboundSender) -> Result<()>;

    /// Stop the transport and release any resources (process, socket, tasks).
    async fn stop(&mut self) -> Result<()>;

    /// Whether the transport currently believes it is connected.
    fn is_connected(&self) -> bool;

    /// Write one already-framed JSON-RPC message. Implementations are
    /// responsible for whatever message-sized framing their wire needs
    /// (a trailing newline for stdio, an HTTP POST body for SSE).
    async fn send_raw(&self, message: &[u8]) -> Result<()>;
}
