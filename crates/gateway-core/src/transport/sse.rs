//! Event-stream transport: a backend reachable over HTTP, fed inbound
//! traffic as Server-Sent Events and accepting outbound requests as POSTs.

use crate::jsonrpc::{parse_inbound, InboundMessage};
use crate::transport::{InboundSender, Transport};
use crate::{Error, Result};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use gateway_config::TokenConfig;
use reqwest::Client;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Cached bearer token plus the instant after which it must be refreshed.
struct CachedToken {
    value: String,
    expires_at: tokio::time::Instant,
}

struct TokenSource {
    config: TokenConfig,
    client: Client,
    cached: RwLock<Option<CachedToken>>,
}

impl TokenSource {
    fn new(config: TokenConfig, client: Client) -> Self {
        Self {
            config,
            client,
            cached: RwLock::new(None),
        }
    }

    async fn token(&self, force_refresh: bool) -> Result<String> {
        if !force_refresh {
            if let Some(cached) = self.cached.read().await.as_ref() {
                if cached.expires_at > tokio::time::Instant::now() {
                    return Ok(cached.value.clone());
                }
            }
        }
        self.fetch().await
    }

    async fn fetch(&self) -> Result<String> {
        #[derive(serde::Serialize)]
        struct TokenRequest<'a> {
            grant_type: &'a str,
            client_id: &'a str,
            client_secret: &'a str,
        }
        #[derive(serde::Deserialize)]
        struct TokenResponse {
            access_token: String,
            #[serde(default)]
            expires_in: Option<u64>,
        }

        let response = self
            .client
            .post(&self.config.token_url)
            .json(&TokenRequest {
                grant_type: "client_credentials",
                client_id: &self.config.client_id,
                client_secret: &self.config.client_secret,
            })
            .send()
            .await
            .map_err(|e| Error::Transport {
                backend: self.config.token_url.clone(),
                message: format!("token request failed: {e}"),
            })?;

        if !response.status().is_success() {
            return Err(Error::Transport {
                backend: self.config.token_url.clone(),
                message: format!("token endpoint returned {}", response.status()),
            });
        }

        let parsed: TokenResponse = response.json().await.map_err(|e| Error::Transport {
            backend: self.config.token_url.clone(),
            message: format!("malformed token response: {e}"),
        })?;

        let ttl = parsed
            .expires_in
            .map(std::time::Duration::from_secs)
            .unwrap_or(self.config.refresh_window() * 4);
        let refresh_margin = self.config.refresh_window();
        let expires_at = tokio::time::Instant::now()
            + ttl.saturating_sub(refresh_margin.min(ttl));

        let mut cached = self.cached.write().await;
        *cached = Some(CachedToken {
            value: parsed.access_token.clone(),
            expires_at,
        });
        Ok(parsed.access_token)
    }
}

/// The backend's own `endpoint` event: where outbound requests must be
/// POSTed, and the session id (if any) to bind them to.
#[derive(serde::Deserialize)]
struct EndpointEvent {
    endpoint: String,
    #[serde(rename = "sessionId", default)]
    session_id: Option<String>,
}

struct RememberedEndpoint {
    url: String,
    session_id: Option<String>,
}

pub struct EventStreamTransport {
    url: String,
    client: Client,
    token_source: Option<Arc<TokenSource>>,
    connected: Arc<AtomicBool>,
    stream_task: Option<tokio::task::JoinHandle<()>>,
    endpoint: Arc<RwLock<Option<RememberedEndpoint>>>,
}

impl EventStreamTransport {
    pub fn new(url: String, token: Option<TokenConfig>) -> Self {
        let client = Client::new();
        let token_source = token.map(|t| Arc::new(TokenSource::new(t, client.clone())));
        Self {
            url,
            client,
            token_source,
            connected: Arc::new(AtomicBool::new(false)),
            stream_task: None,
            endpoint: Arc::new(RwLock::new(None)),
        }
    }

    async fn build_request(
        &self,
        force_refresh_token: bool,
    ) -> Result<reqwest::RequestBuilder> {
        let mut request = self.client.get(&self.url).header("Accept", "text/event-stream");
        if let Some(source) = &self.token_source {
            let token = source.token(force_refresh_token).await?;
            request = request.bearer_auth(token);
        }
        Ok(request)
    }
}

/// Resolve the backend's `endpoint` field (typically a path like
/// `/message`) against the subscribe URL's origin.
fn resolve_endpoint(subscribe_url: &str, endpoint: &str) -> String {
    reqwest::Url::parse(subscribe_url)
        .ok()
        .and_then(|base| base.join(endpoint).ok())
        .map(|u| u.to_string())
        .unwrap_or_else(|| endpoint.to_string())
}

#[async_trait]
impl Transport for EventStreamTransport {
    async fn start(&mut self, inbound: InboundSender) -> Result<()> {
        let url = self.url.clone();
        let client = self.client.clone();
        let token_source = self.token_source.clone();
        let connected = self.connected.clone();

        let request = self.build_request(false).await?;
        let response = request.send().await.map_err(|e| Error::Transport {
            backend: url.clone(),
            message: format!("failed to open event stream: {e}"),
        })?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            if let Some(source) = &token_source {
                source.token(true).await?;
            }
        }
        if !response.status().is_success() {
            return Err(Error::Transport {
                backend: url,
                message: format!("event stream returned {}", response.status()),
            });
        }

        connected.store(true, Ordering::SeqCst);

        let task_inbound = inbound.clone();
        let task_connected = connected.clone();
        let task_url = url.clone();
        let task_endpoint = self.endpoint.clone();
        let stream_task = tokio::spawn(async move {
            let _ = client;
            let mut events = response.bytes_stream().eventsource();
            while let Some(event) = events.next().await {
                match event {
                    Ok(event) => {
                        if event.event == "endpoint" {
                            match serde_json::from_str::<EndpointEvent>(&event.data) {
                                Ok(parsed) => {
                                    let resolved = resolve_endpoint(&task_url, &parsed.endpoint);
                                    tracing::debug!(backend = %task_url, endpoint = %resolved, "remembered endpoint event");
                                    *task_endpoint.write().await = Some(RememberedEndpoint {
                                        url: resolved,
                                        session_id: parsed.session_id,
                                    });
                                }
                                Err(e) => {
                                    tracing::warn!(backend = %task_url, error = %e, "malformed endpoint event");
                                }
                            }
                            continue;
                        }
                        let data = event.data.trim();
                        if data.is_empty() {
                            continue;
                        }
                        match parse_inbound(data) {
                            Ok(message) => {
                                if task_inbound.send(message).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                tracing::warn!(backend = %task_url, error = %e, "malformed SSE payload");
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(backend = %task_url, error = %e, "event stream error");
                        break;
                    }
                }
            }
            task_connected.store(false, Ordering::SeqCst);
            let _ = task_inbound
                .send(InboundMessage::Notification {
                    method: "$/transport/exited".to_string(),
                    params: None,
                })
                .await;
        });

        self.stream_task = Some(stream_task);
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        if let Some(task) = self.stream_task.take() {
            task.abort();
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send_raw(&self, message: &[u8]) -> Result<()> {
        let body = message.to_vec();
        let (target_url, session_id) = match self.endpoint.read().await.as_ref() {
            Some(remembered) => (remembered.url.clone(), remembered.session_id.clone()),
            None => (self.url.clone(), None),
        };

        let build_request = |token: Option<String>| {
            let mut request = self
                .client
                .post(&target_url)
                .header("Content-Type", "application/json");
            if let Some(sid) = &session_id {
                request = request.header("X-Session-ID", sid.clone());
            }
            if let Some(token) = token {
                request = request.bearer_auth(token);
            }
            request
        };

        let initial_token = match &self.token_source {
            Some(source) => Some(source.token(false).await?),
            None => None,
        };
        let response = build_request(initial_token)
            .body(body.clone())
            .send()
            .await
            .map_err(|e| Error::Transport {
                backend: target_url.clone(),
                message: format!("POST failed: {e}"),
            })?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            if let Some(source) = &self.token_source {
                let token = source.token(true).await?;
                let retried = build_request(Some(token))
                    .body(body)
                    .send()
                    .await
                    .map_err(|e| Error::Transport {
                        backend: target_url.clone(),
                        message: format!("POST retry failed: {e}"),
                    })?;
                if !retried.status().is_success() {
                    return Err(Error::Transport {
                        backend: target_url.clone(),
                        message: format!("backend returned {} after token refresh", retried.status()),
                    });
                }
                return Ok(());
            }
        }

        if !response.status().is_success() {
            return Err(Error::Transport {
                backend: target_url.clone(),
                message: format!("backend returned {}", response.status()),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn refreshes_token_on_unauthorized() {
        let mut server = mockito::Server::new_async().await;
        let token_mock = server
            .mock("POST", "/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"abc123","expires_in":3600}"#)
            .create_async()
            .await;

        let source = TokenSource::new(
            TokenConfig {
                token_url: format!("{}/token", server.url()),
                client_id: "id".to_string(),
                client_secret: "secret".to_string(),
                refresh_window_secs: 60,
            },
            Client::new(),
        );

        let token = source.token(false).await.unwrap();
        assert_eq!(token, "abc123");
        token_mock.assert_async().await;
    }

    #[tokio::test]
    async fn send_raw_posts_json_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/rpc")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let transport = EventStreamTransport::new(format!("{}/rpc", server.url()), None);
        transport
            .send_raw(br#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#)
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[test]
    fn resolve_endpoint_joins_path_against_subscribe_origin() {
        let resolved = resolve_endpoint("https://upstream.example/subscribe", "/message");
        assert_eq!(resolved, "https://upstream.example/message");
    }

    #[tokio::test]
    async fn send_raw_uses_the_remembered_endpoint_and_session_header() {
        let mut server = mockito::Server::new_async().await;
        let sse_body = "event: endpoint\ndata: {\"endpoint\":\"/message\",\"sessionId\":\"sess-1\"}\n\n";
        let sse_mock = server
            .mock("GET", "/subscribe")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(sse_body)
            .create_async()
            .await;
        let message_mock = server
            .mock("POST", "/message")
            .match_header("x-session-id", "sess-1")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let mut transport = EventStreamTransport::new(format!("{}/subscribe", server.url()), None);
        let (tx, _rx) = tokio::sync::mpsc::channel(8);
        transport.start(tx).await.unwrap();

        // Give the spawned SSE-reading task a moment to observe the
        // endpoint event before routing a request through it.
        for _ in 0..50 {
            if transport.endpoint.read().await.is_some() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        transport
            .send_raw(br#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#)
            .await
            .unwrap();

        sse_mock.assert_async().await;
        message_mock.assert_async().await;
    }
}
