//! Client-facing SSE multiplexer: one broadcast channel per session,
//! relaying backend replies as `message` events and keeping the
//! connection alive with a heartbeat.

use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

const SSE_HEARTBEAT_SECS: u64 = 30;
const CHANNEL_CAPACITY: usize = 100;

/// One line of SSE output: either a named event with a JSON payload, or a
/// bare comment (used for the heartbeat).
#[derive(Debug, Clone)]
pub enum SseFrame {
    Event { event: String, data: Value },
    Comment(String),
}

impl SseFrame {
    pub fn to_wire(&self) -> String {
        match self {
            SseFrame::Event { event, data } => {
                format!("event: {event}\ndata: {}\n\n", data)
            }
            SseFrame::Comment(text) => format!(": {text}\n\n"),
        }
    }
}

pub struct StreamHub {
    channels: DashMap<Uuid, broadcast::Sender<SseFrame>>,
}

impl Default for StreamHub {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Register a new session's channel and hand back its endpoint event
    /// plus a receiver the HTTP layer can stream to the client.
    pub fn open(&self, session_id: Uuid) -> broadcast::Receiver<SseFrame> {
        let (tx, rx) = broadcast::channel(CHANNEL_CAPACITY);
        let endpoint_event = SseFrame::Event {
            event: "endpoint".to_string(),
            data: serde_json::json!({ "endpoint": "/message", "sessionId": session_id.to_string() }),
        };
        let _ = tx.send(endpoint_event);
        self.channels.insert(session_id, tx);
        rx
    }

    /// Best-effort delivery: a reply destined for a dead or disconnected
    /// stream silently no-ops rather than erroring the caller.
    pub fn send_to_session(&self, session_id: Uuid, payload: Value) {
        if let Some(sender) = self.channels.get(&session_id) {
            let _ = sender.send(SseFrame::Event {
                event: "message".to_string(),
                data: payload,
            });
        }
    }

    pub fn close(&self, session_id: Uuid) {
        self.channels.remove(&session_id);
    }

    pub fn session_count(&self) -> usize {
        self.channels.len()
    }

    pub fn heartbeat_interval() -> Duration {
        Duration::from_secs(SSE_HEARTBEAT_SECS)
    }
}
