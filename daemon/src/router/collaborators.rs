//! Collaborator boundaries the router depends on without owning: the
//! channel server (to actually push a command at an extension) and the
//! browser supervisor (to launch/kill a browser process). Expressed as
//! traits so the router can be constructed and tested independently of
//! sockets or subprocesses; the orchestrator wires in the concrete
//! implementations afterward.

use async_trait::async_trait;

use browserd_protocol::ExtensionCommand;

/// Can push a translated command at an attached extension channel.
#[async_trait]
pub trait ExtensionSender: Send + Sync {
    /// Returns `true` if the command was handed to the transport, `false`
    /// if the session has no open channel. Never retries.
    async fn send_command(&self, session_id: &str, command: ExtensionCommand) -> bool;
}

/// Launches and tears down browser processes on the router's behalf.
#[async_trait]
pub trait BrowserSupervisor: Send + Sync {
    async fn has_browser(&self, session_id: &str) -> bool;
    async fn launch_browser(&self, session_id: &str) -> bool;
    async fn kill_browser(&self, session_id: &str);
}
