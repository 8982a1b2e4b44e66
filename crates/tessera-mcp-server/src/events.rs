//! Session lifecycle events broadcast to external observers.

use tessera_mcp_protocol::Root;

#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// Negotiation finished and the session is ready.
    Connect { session_id: String },
    /// A session that had connected is now closed.
    Disconnect { session_id: String },
    /// The client pushed a roots change; `roots` is the full re-fetched list.
    RootsChanged { session_id: String, roots: Vec<Root> },
    /// The session hit an unrecoverable transport error.
    Error { session_id: String, message: String },
}

impl ServerEvent {
    pub fn session_id(&self) -> &str {
        match self {
            ServerEvent::Connect { session_id }
            | ServerEvent::Disconnect { session_id }
            | ServerEvent::RootsChanged { session_id, .. }
            | ServerEvent::Error { session_id, .. } => session_id,
        }
    }
}
