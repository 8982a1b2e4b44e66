//! Live sessions of one HTTP server
//!
//! Only the adapter mutates the pool: sessions are added after a successful
//! `initialize` and removed on `DELETE`, on event-stream drop and on
//! shutdown. Sessions never reach into it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use tessera_mcp_server::{ChannelLink, McpSession, MessageReceiver, TransportLink};

/// A session plus the outgoing half of its link.
pub struct PooledSession {
    session: Arc<McpSession>,
    link: Arc<ChannelLink>,
    /// Server-initiated frames, queued (up to the link's backlog limit)
    /// until a `GET` stream takes them.
    outgoing: Mutex<Option<MessageReceiver>>,
}

impl PooledSession {
    pub(crate) fn new(
        session: Arc<McpSession>,
        link: Arc<ChannelLink>,
        outgoing: MessageReceiver,
    ) -> Self {
        Self {
            session,
            link,
            outgoing: Mutex::new(Some(outgoing)),
        }
    }

    pub fn session(&self) -> &Arc<McpSession> {
        &self.session
    }

    /// Hand the queued frames to an event stream and mark the link attached.
    /// `None` if one already has them.
    pub(crate) fn take_outgoing(&self) -> Option<MessageReceiver> {
        let outgoing = self.outgoing.lock().take()?;
        self.link.attach();
        Some(outgoing)
    }

    /// True once an event stream drains the session's frames.
    pub fn is_attached(&self) -> bool {
        self.link.is_attached()
    }

    /// Push a frame onto the session's event stream.
    pub(crate) fn forward(&self, frame: Value) {
        if let Err(error) = self.link.send(frame) {
            debug!(session_id = %self.session.id(), error = %error, "frame dropped");
        }
    }
}

/// Aggregate readiness, as served on the readiness endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Readiness {
    pub ready: usize,
    pub total: usize,
}

impl Readiness {
    /// Ready when every session is; vacuously so with none.
    pub fn is_ready(&self) -> bool {
        self.ready == self.total
    }
}

#[derive(Default)]
pub struct SessionPool {
    sessions: RwLock<HashMap<String, Arc<PooledSession>>>,
}

impl SessionPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, entry: Arc<PooledSession>) {
        let id = entry.session.id().to_string();
        self.sessions.write().insert(id, entry);
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<PooledSession>> {
        self.sessions.read().get(session_id).cloned()
    }

    /// Remove and close. Returns false if the id was not live.
    pub fn remove(&self, session_id: &str) -> bool {
        let entry = self.sessions.write().remove(session_id);
        match entry {
            Some(entry) => {
                entry.session.close();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.read().keys().cloned().collect()
    }

    pub fn readiness(&self) -> Readiness {
        let sessions = self.sessions.read();
        Readiness {
            ready: sessions.values().filter(|e| e.session.is_ready()).count(),
            total: sessions.len(),
        }
    }

    /// Empty the pool, handing back everything that was in it.
    pub(crate) fn drain(&self) -> Vec<Arc<PooledSession>> {
        self.sessions.write().drain().map(|(_, entry)| entry).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_mcp_server::{McpServer, SessionConfig};

    fn pooled(server: &McpServer) -> Arc<PooledSession> {
        let (link, rx) = ChannelLink::detached(4);
        let link = Arc::new(link);
        let session = server.create_session(link.clone(), None, SessionConfig::default());
        Arc::new(PooledSession::new(session, link, rx))
    }

    #[test]
    fn test_empty_pool_is_ready() {
        let pool = SessionPool::new();
        let readiness = pool.readiness();
        assert_eq!(readiness, Readiness { ready: 0, total: 0 });
        assert!(readiness.is_ready());
    }

    #[tokio::test]
    async fn test_connecting_session_blocks_readiness() {
        let server = McpServer::builder().build().unwrap();
        let pool = SessionPool::new();
        let entry = pooled(&server);
        let id = entry.session().id().to_string();
        pool.insert(entry.clone());

        assert!(!pool.readiness().is_ready());
        assert!(pool.get(&id).is_some());

        assert!(pool.remove(&id));
        assert!(entry.session().is_closed());
        assert!(!pool.remove(&id));
        assert!(pool.is_empty());
    }

    #[tokio::test]
    async fn test_outgoing_is_taken_once() {
        let server = McpServer::builder().build().unwrap();
        let entry = pooled(&server);
        entry.forward(serde_json::json!({"jsonrpc": "2.0", "method": "ping", "id": 1}));

        assert!(!entry.is_attached());
        let mut outgoing = entry.take_outgoing().unwrap();
        assert!(entry.is_attached());
        assert!(entry.take_outgoing().is_none());
        assert_eq!(outgoing.recv().await.unwrap()["method"], "ping");
    }
}
