//! Child-process transport: spawn a backend as a subprocess and exchange
//! newline-delimited JSON-RPC over its stdio pipes.

use crate::jsonrpc::{parse_inbound, InboundMessage};
use crate::transport::{InboundSender, Transport};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::Mutex;

/// Grace period between a polite termination signal and a forced kill.
const STOP_ESCALATION: Duration = Duration::from_secs(5);

pub struct StdioTransport {
    command: String,
    args: Vec<String>,
    env: HashMap<String, String>,
    child: Option<Child>,
    stdin: Option<Arc<Mutex<ChildStdin>>>,
    connected: Arc<AtomicBool>,
    reader_task: Option<tokio::task::JoinHandle<()>>,
    stderr_task: Option<tokio::task::JoinHandle<()>>,
}

impl StdioTransport {
    pub fn new(command: String, args: Vec<String>, env: HashMap<String, String>) -> Self {
        Self {
            command,
            args,
            env,
            child: None,
            stdin: None,
            connected: Arc::new(AtomicBool::new(false)),
            reader_task: None,
            stderr_task: None,
        }
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn start(&mut self, inbound: InboundSender) -> Result<()> {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| Error::SpawnFailed {
            backend: self.command.clone(),
            source,
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Transport {
                backend: self.command.clone(),
                message: "no stdin pipe".to_string(),
            })?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Transport {
                backend: self.command.clone(),
                message: "no stdout pipe".to_string(),
            })?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Transport {
                backend: self.command.clone(),
                message: "no stderr pipe".to_string(),
            })?;

        self.connected.store(true, Ordering::SeqCst);

        let connected = self.connected.clone();
        let backend_name = self.command.clone();
        let reader_inbound = inbound.clone();
        let reader_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        match parse_inbound(&line) {
                            Ok(message) => {
                                if reader_inbound.send(message).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                tracing::warn!(backend = %backend_name, error = %e, "malformed line from backend stdout");
                            }
                        }
                    }
                    Ok(None) => {
                        tracing::info!(backend = %backend_name, "backend stdout closed");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(backend = %backend_name, error = %e, "error reading backend stdout");
                        break;
                    }
                }
            }
            connected.store(false, Ordering::SeqCst);
            let _ = reader_inbound
                .send(InboundMessage::Notification {
                    method: "$/transport/exited".to_string(),
                    params: None,
                })
                .await;
        });

        let stderr_backend_name = self.command.clone();
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::warn!(backend = %stderr_backend_name, "stderr: {line}");
            }
        });

        self.child = Some(child);
        self.stdin = Some(Arc::new(Mutex::new(stdin)));
        self.reader_task = Some(reader_task);
        self.stderr_task = Some(stderr_task);
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);

        if let Some(mut child) = self.child.take() {
            #[cfg(unix)]
            {
                if let Some(pid) = child.id() {
                    unsafe {
                        libc::kill(pid as libc::pid_t, libc::SIGTERM);
                    }
                }
            }

            let exited = tokio::time::timeout(STOP_ESCALATION, child.wait()).await;
            if exited.is_err() {
                let _ = child.kill().await;
                let _ = child.wait().await;
            }
        }

        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
        self.stdin = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send_raw(&self, message: &[u8]) -> Result<()> {
        let stdin = self.stdin.as_ref().ok_or_else(|| Error::Transport {
            backend: self.command.clone(),
            message: "not started".to_string(),
        })?;
        let mut guard = stdin.lock().await;
        guard.write_all(message).await?;
        guard.write_all(b"\n").await?;
        guard.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn spawns_and_exchanges_lines() {
        // `cat` echoes each stdin line back on stdout, letting us exercise
        // the framing loop without a real MCP backend.
        let mut transport = StdioTransport::new("cat".to_string(), vec![], HashMap::new());
        let (tx, mut rx) = mpsc::channel(8);
        transport.start(tx).await.unwrap();
        assert!(transport.is_connected());

        transport
            .send_raw(br#"{"jsonrpc":"2.0","id":1,"result":{}}"#)
            .await
            .unwrap();

        let msg = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("did not receive echoed line in time")
            .expect("channel closed");
        match msg {
            InboundMessage::Response(r) => assert_eq!(r.id, serde_json::json!(1)),
            _ => panic!("expected response"),
        }

        transport.stop().await.unwrap();
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn spawn_failure_surfaces_as_error() {
        let mut transport = StdioTransport::new(
            "nonexistent-binary-xyz".to_string(),
            vec![],
            HashMap::new(),
        );
        let (tx, _rx) = mpsc::channel(8);
        let result = transport.start(tx).await;
        assert!(matches!(result, Err(Error::SpawnFailed { .. })));
    }
}
