//! Session state and the session record itself.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a session, per the data model:
/// `pending -> awaiting_extension -> connected <-> disconnected -> closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Pending,
    AwaitingExtension,
    Connected,
    Disconnected,
    Closed,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::AwaitingExtension => "awaiting_extension",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Closed => "closed",
        }
    }
}

/// A single browser session tracked by the registry.
///
/// `extension_tx` is attached once an extension channel completes
/// registration for this session, and cleared (not removed) on
/// disconnect, so a reconnecting extension with a matching cached id can
/// be reattached instead of minted a new session.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub name: Option<String>,
    pub state: SessionState,
    pub created_at_unix_ms: u64,
    pub window_id: Option<u64>,
}

impl Session {
    pub fn new(id: String, name: Option<String>, created_at_unix_ms: u64) -> Self {
        Self {
            id,
            name,
            state: SessionState::Pending,
            created_at_unix_ms,
            window_id: None,
        }
    }
}
