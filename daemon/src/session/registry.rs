//! Session registry.
//!
//! A `Mutex<HashMap<..>>` session table holding each session's state
//! machine and, when attached, the channel handle used to reach its
//! extension.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use browserd_protocol::{CloseCode, ExtensionCommand, ExtensionOutbound};

use super::types::{Session, SessionState};

/// Everything the channel server's per-connection writer task can be told
/// to put on the wire. Kept as a plain enum rather than a single serde
/// type because each variant serializes differently: a command has no
/// envelope, the control messages are tagged, and a close carries no
/// payload of its own once it is translated to wire bytes.
#[derive(Debug, Clone)]
pub enum ChannelOutbound {
    Command(ExtensionCommand),
    Control(ExtensionOutbound),
    Close(CloseCode),
}

/// Handle the registry keeps for an attached extension channel: just
/// enough to forward a translated command, by opaque id only. The
/// channel server owns the actual connection; this is a lookup, not a
/// lifetime reference, per the ownership rule in the data model.
#[derive(Debug, Clone)]
pub struct ExtensionHandle {
    pub window_id: u64,
    pub sender: mpsc::UnboundedSender<ChannelOutbound>,
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("not found")]
    NotFound,
    #[error("session already has an attached extension")]
    AlreadyAttached,
}

struct Entry {
    session: Session,
    extension: Option<ExtensionHandle>,
}

/// Monotonic counter standing in for wall-clock creation order within one
/// process lifetime; actual timestamps come from the caller so tests can
/// control ordering without sleeping.
#[derive(Default)]
struct Inner {
    sessions: HashMap<String, Entry>,
    next_seq: u64,
}

pub struct SessionRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// Create a new session. `created_at_unix_ms` is supplied by the
    /// caller (the orchestrator clock) rather than read here, keeping this
    /// type free of wall-clock side effects.
    pub async fn create(&self, name: Option<String>, created_at_unix_ms: u64) -> Session {
        let mut inner = self.inner.lock().await;
        let seq = inner.next_seq;
        inner.next_seq += 1;
        let id = format!("sess-{seq}-{}", uuid::Uuid::new_v4());
        let session = Session::new(id.clone(), name, created_at_unix_ms);
        inner.sessions.insert(
            id,
            Entry {
                session: session.clone(),
                extension: None,
            },
        );
        session
    }

    pub async fn get(&self, id: &str) -> Option<Session> {
        let inner = self.inner.lock().await;
        inner.sessions.get(id).map(|e| e.session.clone())
    }

    /// Sessions in `awaiting_extension`, oldest first by creation order.
    pub async fn list_awaiting_extension(&self) -> Vec<Session> {
        self.list_by_state(SessionState::AwaitingExtension).await
    }

    pub async fn list_by_state(&self, state: SessionState) -> Vec<Session> {
        let inner = self.inner.lock().await;
        let mut sessions: Vec<Session> = inner
            .sessions
            .values()
            .filter(|e| e.session.state == state)
            .map(|e| e.session.clone())
            .collect();
        sessions.sort_by_key(|s| s.created_at_unix_ms);
        sessions
    }

    pub async fn list_all(&self) -> Vec<Session> {
        let inner = self.inner.lock().await;
        let mut sessions: Vec<Session> = inner.sessions.values().map(|e| e.session.clone()).collect();
        sessions.sort_by_key(|s| s.created_at_unix_ms);
        sessions
    }

    pub async fn set_state(&self, id: &str, state: SessionState) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock().await;
        let entry = inner.sessions.get_mut(id).ok_or(RegistryError::NotFound)?;
        entry.session.state = state;
        Ok(())
    }

    pub async fn set_window_id(&self, id: &str, window_id: u64) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock().await;
        let entry = inner.sessions.get_mut(id).ok_or(RegistryError::NotFound)?;
        entry.session.window_id = Some(window_id);
        Ok(())
    }

    /// Attach an extension channel to a session. Rejected if one is
    /// already attached — the channel server must detach the prior one
    /// first (closing it with code 4001) before calling this again.
    pub async fn attach_extension(
        &self,
        id: &str,
        handle: ExtensionHandle,
    ) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock().await;
        let entry = inner.sessions.get_mut(id).ok_or(RegistryError::NotFound)?;
        if entry.extension.is_some() {
            return Err(RegistryError::AlreadyAttached);
        }
        entry.extension = Some(handle);
        Ok(())
    }

    pub async fn detach_extension(&self, id: &str) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock().await;
        let entry = inner.sessions.get_mut(id).ok_or(RegistryError::NotFound)?;
        entry.extension = None;
        Ok(())
    }

    pub async fn extension_handle(&self, id: &str) -> Option<ExtensionHandle> {
        let inner = self.inner.lock().await;
        inner.sessions.get(id).and_then(|e| e.extension.clone())
    }

    pub async fn has_extension(&self, id: &str) -> bool {
        let inner = self.inner.lock().await;
        inner
            .sessions
            .get(id)
            .map(|e| e.extension.is_some())
            .unwrap_or(false)
    }

    pub async fn close(&self, id: &str) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock().await;
        let entry = inner.sessions.get_mut(id).ok_or(RegistryError::NotFound)?;
        entry.session.state = SessionState::Closed;
        entry.extension = None;
        Ok(())
    }

    /// All session ids currently tracked, for shutdown fan-out.
    pub async fn all_ids(&self) -> Vec<String> {
        let inner = self.inner.lock().await;
        inner.sessions.keys().cloned().collect()
    }
}
