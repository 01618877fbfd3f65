//! The three client-facing HTTP routes. Route wiring and request
//! extraction are axum's job; these handlers only translate HTTP in and
//! out of calls on the shared [`gateway_core::Gateway`].

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::{Stream, StreamExt};
use gateway_core::sse_stream::SseFrame;
use gateway_core::Gateway;
use serde_json::Value;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use uuid::Uuid;

const SESSION_HEADER: &str = "x-session-id";

pub fn router(gateway: Arc<Gateway>) -> Router {
    Router::new()
        .route("/sse", get(sse_handler))
        .route("/message", post(message_handler))
        .route("/rpc", post(rpc_handler))
        .with_state(gateway)
}

/// Releases a session's server-side state the moment its SSE stream stops
/// being polled — client disconnect, not just the periodic idle sweep.
struct SessionGuard {
    gateway: Arc<Gateway>,
    session_id: Uuid,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.gateway.sessions().remove(self.session_id);
        self.gateway.streams().close(self.session_id);
    }
}

struct GuardedStream<S> {
    inner: S,
    _guard: SessionGuard,
}

impl<S: Stream + Unpin> Stream for GuardedStream<S> {
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

async fn sse_handler(
    State(gateway): State<Arc<Gateway>>,
) -> Sse<impl futures::Stream<Item = Result<Event, Infallible>>> {
    let session = gateway.sessions().create_session();
    let receiver = gateway.streams().open(session.id);

    let stream = tokio_stream::wrappers::BroadcastStream::new(receiver).filter_map(|frame| async move {
        match frame {
            Ok(SseFrame::Event { event, data }) => Some(Ok(Event::default().event(event).data(data.to_string()))),
            Ok(SseFrame::Comment(text)) => Some(Ok(Event::default().comment(text))),
            Err(_) => None,
        }
    });

    let guarded = GuardedStream {
        inner: stream,
        _guard: SessionGuard {
            gateway,
            session_id: session.id,
        },
    };

    Sse::new(guarded).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("ping"),
    )
}

async fn message_handler(
    State(gateway): State<Arc<Gateway>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let session_id = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v).ok());

    dispatch(&gateway, body, session_id).await
}

async fn rpc_handler(State(gateway): State<Arc<Gateway>>, Json(body): Json<Value>) -> impl IntoResponse {
    dispatch(&gateway, body, None).await
}

async fn dispatch(gateway: &Gateway, body: Value, session_id: Option<Uuid>) -> impl IntoResponse {
    let id = body.get("id").cloned();
    let method = body.get("method").and_then(Value::as_str).unwrap_or_default().to_string();
    let params = body.get("params").cloned();

    let response = gateway.handle(id, &method, params, session_id).await;
    (StatusCode::OK, Json(response))
}
