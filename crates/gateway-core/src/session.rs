//! Client sessions: one per open event-stream connection, evicted by a
//! periodic sweep once idle beyond the configured timeout.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub created_at: Instant,
    pub last_activity: Instant,
    pub client_name: Option<String>,
    pub client_version: Option<String>,
}

impl Session {
    fn new() -> Self {
        let now = Instant::now();
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            last_activity: now,
            client_name: None,
            client_version: None,
        }
    }
}

pub struct SessionManager {
    sessions: DashMap<Uuid, Session>,
    timeout: Duration,
    sweep_task: tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl SessionManager {
    pub fn new(timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            sessions: DashMap::new(),
            timeout,
            sweep_task: tokio::sync::Mutex::new(None),
        })
    }

    pub fn create_session(&self) -> Session {
        let session = Session::new();
        self.sessions.insert(session.id, session.clone());
        session
    }

    pub fn touch(&self, id: Uuid) {
        if let Some(mut session) = self.sessions.get_mut(&id) {
            session.last_activity = Instant::now();
        }
    }

    pub fn get(&self, id: Uuid) -> Option<Session> {
        self.sessions.get(&id).map(|s| s.clone())
    }

    pub fn remove(&self, id: Uuid) {
        self.sessions.remove(&id);
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// `min(session_timeout/2, 60s)`, matching the sweep cadence.
    fn sweep_interval(&self) -> Duration {
        std::cmp::min(self.timeout / 2, Duration::from_secs(60))
    }

    fn sweep_once(&self) {
        let timeout = self.timeout;
        self.sessions
            .retain(|_, session| session.last_activity.elapsed() < timeout);
    }

    pub async fn start_sweep(self: &Arc<Self>) {
        let manager = self.clone();
        let interval = self.sweep_interval();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                manager.sweep_once();
            }
        });
        *self.sweep_task.lock().await = Some(task);
    }

    pub async fn shutdown(&self) {
        if let Some(task) = self.sweep_task.lock().await.take() {
            task.abort();
        }
        self.sessions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_touch_session() {
        let manager = SessionManager::new(Duration::from_secs(1800));
        let session = manager.create_session();
        assert_eq!(manager.session_count(), 1);
        manager.touch(session.id);
        assert!(manager.get(session.id).is_some());
    }

    #[test]
    fn sweep_evicts_idle_sessions() {
        let manager = SessionManager::new(Duration::from_millis(1));
        let session = manager.create_session();
        std::thread::sleep(Duration::from_millis(20));
        manager.sweep_once();
        assert!(manager.get(session.id).is_none());
    }

    #[test]
    fn sweep_interval_respects_60s_cap() {
        let manager = SessionManager::new(Duration::from_secs(7200));
        assert_eq!(manager.sweep_interval(), Duration::from_secs(60));
        let manager = SessionManager::new(Duration::from_secs(20));
        assert_eq!(manager.sweep_interval(), Duration::from_secs(10));
    }
}
