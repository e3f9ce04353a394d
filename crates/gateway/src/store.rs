use crate::error::ApiError;
use session::Session;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

pub type SharedSession = Arc<Mutex<Session>>;

/// Live sessions keyed by id. Each session has its own lock so interactions
/// on one session serialize without blocking the others.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, SharedSession>>>,
    max_sessions: usize,
}

impl SessionStore {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            max_sessions,
        }
    }

    pub async fn create(&self) -> Result<SharedSession, ApiError> {
        let mut sessions = self.sessions.write().await;
        if sessions.len() >= self.max_sessions {
            return Err(ApiError::SessionLimit(self.max_sessions));
        }

        let session = Session::new();
        let id = session.id();
        let session = Arc::new(Mutex::new(session));
        sessions.insert(id, Arc::clone(&session));

        tracing::info!(session = %id, live = sessions.len(), "Session created");
        Ok(session)
    }

    pub async fn get(&self, id: &str) -> Result<SharedSession, ApiError> {
        let unknown = || ApiError::UnknownSession(id.to_string());
        let uuid = Uuid::parse_str(id).map_err(|_| unknown())?;
        self.sessions
            .read()
            .await
            .get(&uuid)
            .cloned()
            .ok_or_else(unknown)
    }

    pub async fn remove(&self, id: &str) -> Result<(), ApiError> {
        let unknown = || ApiError::UnknownSession(id.to_string());
        let uuid = Uuid::parse_str(id).map_err(|_| unknown())?;
        match self.sessions.write().await.remove(&uuid) {
            Some(_) => {
                tracing::info!(session = %uuid, "Session ended");
                Ok(())
            }
            None => Err(unknown()),
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drop sessions idle for longer than `ttl`. Sessions busy with a request
    /// are skipped.
    pub async fn evict_idle(&self, ttl: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| match session.try_lock() {
            Ok(session) => session.idle_for() <= ttl,
            Err(_) => true,
        });
        let evicted = before - sessions.len();
        if evicted > 0 {
            tracing::info!(evicted, live = sessions.len(), "Evicted idle sessions");
        }
        evicted
    }

    /// Run [`SessionStore::evict_idle`] periodically in the background.
    pub fn spawn_sweeper(&self, ttl: Duration) -> JoinHandle<()> {
        let store = self.clone();
        let period = (ttl / 4).max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                store.evict_idle(ttl).await;
            }
        })
    }
}
