//! Error taxonomy shared across the router, channel server, and client
//! server. `Display` on [`RouterError`] is the single source of truth for
//! the string a client sees in a [`CommandResponse::error`] field — the
//! same text is what gets logged.
//!
//! [`CommandResponse::error`]: browserd_protocol::CommandResponse

use thiserror::Error;

/// Errors that can terminate a submitted command.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RouterError {
    #[error("Session not found")]
    SessionNotFound,
    #[error("Failed to send command to extension")]
    SendFailed,
    #[error("Command timed out")]
    Timeout,
    #[error("Extension disconnected")]
    ExtensionDisconnected,
    #[error("Extension did not connect in time")]
    BrowserLaunchTimeout,
    #[error("Failed to launch browser")]
    BrowserLaunchFailed,
    #[error("Command cancelled: daemon shutting down")]
    Cancelled,
    #[error("Session closed")]
    SessionClosed,
}

/// Errors validating a command's structure, before it ever reaches the
/// router's session lookup.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("id must be a non-empty string")]
    EmptyId,
    #[error("sessionId must be a non-empty string")]
    EmptySessionId,
    #[error("params must be a JSON object when present")]
    ParamsNotAnObject,
}

/// Top-level daemon error, used at the orchestrator/binary boundary where
/// collaborator-boundary failures (socket I/O, config loading) surface.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("failed to bind local client socket: {0}")]
    ClientSocketBind(#[source] std::io::Error),
    #[error("failed to bind extension channel listener: {0}")]
    ChannelListenerBind(#[source] std::io::Error),
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
