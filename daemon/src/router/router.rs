//! Command router.
//!
//! Owns per-session pending entries and FIFO queues. The channel server
//! and browser supervisor are reached through the [`ExtensionSender`] and
//! [`BrowserSupervisor`] traits so this module has no concrete dependency
//! on sockets or subprocesses.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::{oneshot, Mutex};
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use browserd_protocol::{Command, CommandResponse, CommandType, ExtensionCommand};

use crate::error::{RouterError, ValidationError};
use crate::session::{SessionRegistry, SessionState};

use super::collaborators::{BrowserSupervisor, ExtensionSender};

struct QueuedCommand {
    command: Command,
    respond_to: oneshot::Sender<CommandResponse>,
}

struct PendingEntry {
    command_id: String,
    respond_to: Option<oneshot::Sender<CommandResponse>>,
    /// `None` until `execute` finishes sending and arms the timeout; a
    /// pending entry is reserved synchronously before the send, so there
    /// is a brief window where it exists without a timer yet.
    timeout_handle: Option<AbortHandle>,
}

#[derive(Default)]
struct SessionQueue {
    pending: Option<PendingEntry>,
    queue: VecDeque<QueuedCommand>,
}

#[derive(Debug, Clone, Copy)]
pub struct RouterConfig {
    pub browser_launch_timeout_ms: u64,
    pub command_timeout_ms: u64,
}

pub struct Router {
    registry: Arc<SessionRegistry>,
    sender: Arc<dyn ExtensionSender>,
    supervisor: Arc<dyn BrowserSupervisor>,
    config: RouterConfig,
    queues: Mutex<HashMap<String, SessionQueue>>,
    connect_waiters: Mutex<HashMap<String, Vec<oneshot::Sender<()>>>>,
}

impl Router {
    pub fn new(
        registry: Arc<SessionRegistry>,
        sender: Arc<dyn ExtensionSender>,
        supervisor: Arc<dyn BrowserSupervisor>,
        config: RouterConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            sender,
            supervisor,
            config,
            queues: Mutex::new(HashMap::new()),
            connect_waiters: Mutex::new(HashMap::new()),
        })
    }

    /// Submit a command for execution. Suspends until the command
    /// terminates (response, timeout, disconnect, or cancel).
    pub async fn submit_command(self: &Arc<Self>, command: Command) -> CommandResponse {
        if let Err(err) = validate(&command) {
            return CommandResponse::failed(command.id, err.to_string());
        }

        if self.registry.get(&command.session_id).await.is_none() {
            return CommandResponse::failed(command.id, RouterError::SessionNotFound.to_string());
        }

        if !self.registry.has_extension(&command.session_id).await {
            if let Err(err) = self.ensure_extension(&command.session_id).await {
                return CommandResponse::failed(command.id, err.to_string());
            }
        }

        let command_id = command.id.clone();
        let session_id = command.session_id.clone();
        let (respond_tx, respond_rx) = oneshot::channel();
        let mut command_to_execute = Some(command);

        {
            let mut queues = self.queues.lock().await;
            let session_queue = queues.entry(session_id.clone()).or_default();
            if session_queue.pending.is_some() {
                session_queue.queue.push_back(QueuedCommand {
                    command: command_to_execute.take().unwrap(),
                    respond_to: respond_tx,
                });
            } else {
                // Reserve the pending slot synchronously, under the same
                // lock as the is_some() check above, so a second
                // concurrent submission for this session cannot also see
                // an empty slot and execute while this one's
                // `send_command` await is still in flight.
                session_queue.pending = Some(PendingEntry {
                    command_id: command_id.clone(),
                    respond_to: Some(respond_tx),
                    timeout_handle: None,
                });
            }
        }

        if let Some(command) = command_to_execute {
            let next = self.execute(&session_id, command).await;
            self.drain_queue(&session_id, next).await;
        }

        match respond_rx.await {
            Ok(response) => response,
            Err(_) => CommandResponse::failed(command_id, RouterError::Cancelled.to_string()),
        }
    }

    /// Called by the channel server once a registration handshake
    /// completes. Wakes every task waiting on this session's connection.
    pub async fn on_extension_connected(&self, session_id: &str) {
        let mut waiters = self.connect_waiters.lock().await;
        if let Some(list) = waiters.remove(session_id) {
            for tx in list {
                let _ = tx.send(());
            }
        }
    }

    /// Called by the channel server for every raw or unwrapped response.
    pub async fn handle_extension_response(self: &Arc<Self>, session_id: &str, response: CommandResponse) {
        let (matched, next) = {
            let mut queues = self.queues.lock().await;
            let Some(session_queue) = queues.get_mut(session_id) else {
                return;
            };
            let is_match = matches!(&session_queue.pending, Some(p) if p.command_id == response.id);
            if !is_match {
                (None, None)
            } else {
                let mut pending = session_queue.pending.take().unwrap();
                if let Some(handle) = pending.timeout_handle.take() {
                    handle.abort();
                }
                (pending.respond_to.take(), session_queue.queue.pop_front())
            }
        };

        match matched {
            Some(tx) => {
                let _ = tx.send(response);
            }
            None => {
                debug!(session_id, command_id = %response.id, "dropping response with no matching pending entry");
                return;
            }
        }

        self.drain_queue(session_id, next).await;
    }

    /// Called by the channel server on any channel teardown.
    pub async fn handle_extension_disconnected(self: &Arc<Self>, session_id: &str) {
        if !self.fail_session_queue(session_id, RouterError::ExtensionDisconnected).await {
            return;
        }
        let _ = self.registry.set_state(session_id, SessionState::Disconnected).await;
    }

    /// Called when a client explicitly closes a session. Drains pending
    /// and queued commands like `handle_extension_disconnected`, but
    /// leaves session state untouched — the caller sets `closed` itself
    /// afterward, so that write stays last and terminal.
    pub async fn handle_session_closing(self: &Arc<Self>, session_id: &str) {
        self.fail_session_queue(session_id, RouterError::SessionClosed).await;
    }

    /// Removes a session's queue entirely and fails its pending and
    /// queued commands with `error`. Returns `false` if there was nothing
    /// tracked for this session (no-op for the caller).
    async fn fail_session_queue(self: &Arc<Self>, session_id: &str, error: RouterError) -> bool {
        let (pending, queued) = {
            let mut queues = self.queues.lock().await;
            match queues.remove(session_id) {
                Some(session_queue) => (session_queue.pending, session_queue.queue),
                None => return false,
            }
        };

        if let Some(mut pending) = pending {
            if let Some(handle) = pending.timeout_handle.take() {
                handle.abort();
            }
            if let Some(tx) = pending.respond_to.take() {
                let _ = tx.send(CommandResponse::failed(pending.command_id, error.to_string()));
            }
        }
        for queued in queued {
            let _ = queued
                .respond_to
                .send(CommandResponse::failed(queued.command.id, error.to_string()));
        }
        true
    }

    /// Complete every in-flight and queued command with a shutdown error.
    pub async fn cancel_all(self: &Arc<Self>) {
        let mut queues = self.queues.lock().await;
        for (_, session_queue) in queues.drain() {
            if let Some(mut pending) = session_queue.pending {
                if let Some(handle) = pending.timeout_handle.take() {
                    handle.abort();
                }
                if let Some(tx) = pending.respond_to.take() {
                    let _ = tx.send(CommandResponse::failed(
                        pending.command_id,
                        RouterError::Cancelled.to_string(),
                    ));
                }
            }
            for queued in session_queue.queue {
                let _ = queued.respond_to.send(CommandResponse::failed(
                    queued.command.id,
                    RouterError::Cancelled.to_string(),
                ));
            }
        }
    }

    async fn ensure_extension(self: &Arc<Self>, session_id: &str) -> Result<(), RouterError> {
        if !self.supervisor.has_browser(session_id).await {
            let _ = self
                .registry
                .set_state(session_id, SessionState::AwaitingExtension)
                .await;
            if !self.supervisor.launch_browser(session_id).await {
                let _ = self.registry.set_state(session_id, SessionState::Disconnected).await;
                return Err(RouterError::BrowserLaunchFailed);
            }
        }

        let connected = self
            .wait_for_connection(session_id, self.config.browser_launch_timeout_ms)
            .await;
        if !connected {
            self.supervisor.kill_browser(session_id).await;
            let _ = self.registry.set_state(session_id, SessionState::Disconnected).await;
            return Err(RouterError::BrowserLaunchTimeout);
        }
        Ok(())
    }

    async fn wait_for_connection(&self, session_id: &str, timeout_ms: u64) -> bool {
        let (tx, rx) = oneshot::channel();
        {
            let mut waiters = self.connect_waiters.lock().await;
            waiters.entry(session_id.to_string()).or_default().push(tx);
        }
        // A connection may have completed between the caller's own check
        // and this registration; re-check to avoid waiting past a signal
        // that already fired for a different waiter set.
        if self.registry.has_extension(session_id).await {
            return true;
        }
        matches!(
            tokio::time::timeout(Duration::from_millis(timeout_ms), rx).await,
            Ok(Ok(()))
        )
    }

    /// Sends `command`, whose `PendingEntry` the caller has already
    /// reserved synchronously under `queues`. Returns the next queued
    /// command to dispatch, if the send failed and one was waiting —
    /// the caller (`submit_command` or `drain_queue`) is responsible for
    /// reserving a pending entry for it and looping back through
    /// `execute`.
    async fn execute(self: &Arc<Self>, session_id: &str, command: Command) -> Option<QueuedCommand> {
        let extension_command = translate(&command);

        if !self.sender.send_command(session_id, extension_command).await {
            let (respond_to, next) = {
                let mut queues = self.queues.lock().await;
                let Some(session_queue) = queues.get_mut(session_id) else {
                    return None;
                };
                let is_match = matches!(&session_queue.pending, Some(p) if p.command_id == command.id);
                if !is_match {
                    return None;
                }
                let mut pending = session_queue.pending.take().unwrap();
                (pending.respond_to.take(), session_queue.queue.pop_front())
            };
            if let Some(tx) = respond_to {
                let _ = tx.send(CommandResponse::failed(command.id, RouterError::SendFailed.to_string()));
            }
            return next;
        }

        let timeout_handle = self.spawn_timeout(session_id.to_string(), command.id.clone());
        let mut queues = self.queues.lock().await;
        match queues.get_mut(session_id) {
            Some(session_queue) if matches!(&session_queue.pending, Some(p) if p.command_id == command.id) => {
                session_queue.pending.as_mut().unwrap().timeout_handle = Some(timeout_handle);
            }
            // The pending entry was already drained by a concurrent
            // disconnect or cancel while the send was in flight; the
            // timeout it would have guarded no longer applies.
            _ => timeout_handle.abort(),
        }
        None
    }

    /// Reserves a pending entry for and dispatches each queued command in
    /// turn, following the chain of "next" commands a failed send or a
    /// timeout surfaces, until the queue runs dry.
    async fn drain_queue(self: &Arc<Self>, session_id: &str, mut next: Option<QueuedCommand>) {
        while let Some(queued) = next {
            let QueuedCommand { command, respond_to } = queued;
            {
                let mut queues = self.queues.lock().await;
                let session_queue = queues.entry(session_id.to_string()).or_default();
                session_queue.pending = Some(PendingEntry {
                    command_id: command.id.clone(),
                    respond_to: Some(respond_to),
                    timeout_handle: None,
                });
            }
            next = self.execute(session_id, command).await;
        }
    }

    fn spawn_timeout(self: &Arc<Self>, session_id: String, command_id: String) -> AbortHandle {
        let router = Arc::clone(self);
        let timeout_ms = self.config.command_timeout_ms;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(timeout_ms)).await;
            router.fail_pending_as_timeout(&session_id, &command_id).await;
        });
        handle.abort_handle()
    }

    async fn fail_pending_as_timeout(self: &Arc<Self>, session_id: &str, command_id: &str) {
        let (respond_to, next) = {
            let mut queues = self.queues.lock().await;
            let Some(session_queue) = queues.get_mut(session_id) else {
                return;
            };
            let is_match = matches!(&session_queue.pending, Some(p) if p.command_id == command_id);
            if !is_match {
                return;
            }
            let mut pending = session_queue.pending.take().unwrap();
            (pending.respond_to.take(), session_queue.queue.pop_front())
        };

        warn!(session_id, command_id, "command timed out");
        if let Some(tx) = respond_to {
            let _ = tx.send(CommandResponse::failed(command_id, RouterError::Timeout.to_string()));
        }
        self.drain_queue(session_id, next).await;
    }
}

fn validate(command: &Command) -> Result<(), ValidationError> {
    if command.id.trim().is_empty() {
        return Err(ValidationError::EmptyId);
    }
    if command.session_id.trim().is_empty() {
        return Err(ValidationError::EmptySessionId);
    }
    if let Some(params) = &command.params {
        if !params.is_object() {
            return Err(ValidationError::ParamsNotAnObject);
        }
    }
    Ok(())
}

/// Translate a client-facing command into the extension-facing shape:
/// `navigate` becomes `open`; the `tab_*` family collapses to `tab` with
/// an `action` subfield; everything else passes through unchanged.
fn translate(command: &Command) -> ExtensionCommand {
    if command.command_type.is_tab_family() {
        let action = match command.command_type {
            CommandType::TabNew => "new",
            CommandType::TabClose => "close",
            CommandType::TabSwitch => "switch",
            CommandType::TabList => "list",
            _ => unreachable!("is_tab_family guarantees one of the tab_* variants"),
        };
        let mut params = command.params.clone().unwrap_or_else(|| json!({}));
        if let Some(object) = params.as_object_mut() {
            object.insert("action".to_string(), json!(action));
        }
        return ExtensionCommand {
            id: command.id.clone(),
            command_type: "tab".to_string(),
            params: Some(params),
        };
    }

    let wire_type = if matches!(command.command_type, CommandType::Navigate) {
        "open"
    } else {
        command.command_type.wire_str()
    };

    ExtensionCommand {
        id: command.id.clone(),
        command_type: wire_type.to_string(),
        params: command.params.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionRegistry;
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    struct RecordingSender {
        sent: mpsc::UnboundedSender<ExtensionCommand>,
        always_connected: Arc<std::sync::Mutex<bool>>,
    }

    #[async_trait]
    impl ExtensionSender for RecordingSender {
        async fn send_command(&self, _session_id: &str, command: ExtensionCommand) -> bool {
            let connected = *self.always_connected.lock().unwrap();
            if connected {
                let _ = self.sent.send(command);
            }
            connected
        }
    }

    struct NeverLaunches;

    #[async_trait]
    impl BrowserSupervisor for NeverLaunches {
        async fn has_browser(&self, _session_id: &str) -> bool {
            true
        }
        async fn launch_browser(&self, _session_id: &str) -> bool {
            true
        }
        async fn kill_browser(&self, _session_id: &str) {}
    }

    struct FailingSupervisor;

    #[async_trait]
    impl BrowserSupervisor for FailingSupervisor {
        async fn has_browser(&self, _session_id: &str) -> bool {
            false
        }
        async fn launch_browser(&self, _session_id: &str) -> bool {
            false
        }
        async fn kill_browser(&self, _session_id: &str) {}
    }

    fn config() -> RouterConfig {
        RouterConfig {
            browser_launch_timeout_ms: 200,
            command_timeout_ms: 200,
        }
    }

    fn command(id: &str, session_id: &str, ty: CommandType) -> Command {
        Command {
            id: id.into(),
            session_id: session_id.into(),
            command_type: ty,
            params: Some(json!({})),
            timestamp: "2026-07-28T00:00:00Z".into(),
        }
    }

    async fn attached_router(
        sent: mpsc::UnboundedSender<ExtensionCommand>,
    ) -> (Arc<Router>, Arc<SessionRegistry>, String) {
        let registry = Arc::new(SessionRegistry::new());
        let session = registry.create(None, 0).await;
        let (tx, _rx) = mpsc::unbounded_channel();
        registry
            .attach_extension(
                &session.id,
                crate::session::ExtensionHandle { window_id: 1, sender: tx },
            )
            .await
            .unwrap();

        let sender = Arc::new(RecordingSender {
            sent,
            always_connected: Arc::new(std::sync::Mutex::new(true)),
        });
        let router = Router::new(Arc::clone(&registry), sender, Arc::new(NeverLaunches), config());
        (router, registry, session.id)
    }

    #[tokio::test]
    async fn validation_error_for_empty_id() {
        let registry = Arc::new(SessionRegistry::new());
        let (tx, _rx) = mpsc::unbounded_channel();
        let router = Router::new(
            registry,
            Arc::new(RecordingSender {
                sent: tx,
                always_connected: Arc::new(std::sync::Mutex::new(true)),
            }),
            Arc::new(NeverLaunches),
            config(),
        );
        let response = router
            .submit_command(command("", "s1", CommandType::Snapshot))
            .await;
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("id must be a non-empty string"));
    }

    #[tokio::test]
    async fn unknown_session_is_reported_as_not_found() {
        let registry = Arc::new(SessionRegistry::new());
        let (tx, _rx) = mpsc::unbounded_channel();
        let router = Router::new(
            registry,
            Arc::new(RecordingSender {
                sent: tx,
                always_connected: Arc::new(std::sync::Mutex::new(true)),
            }),
            Arc::new(NeverLaunches),
            config(),
        );
        let response = router
            .submit_command(command("c1", "nope", CommandType::Snapshot))
            .await;
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("Session not found"));
    }

    #[tokio::test]
    async fn executes_immediately_and_completes_on_response() {
        let (sent_tx, mut sent_rx) = mpsc::unbounded_channel();
        let (router, _registry, session_id) = attached_router(sent_tx).await;

        let router_clone = Arc::clone(&router);
        let session_for_task = session_id.clone();
        let submit = tokio::spawn(async move {
            router_clone
                .submit_command(command("c1", &session_for_task, CommandType::Snapshot))
                .await
        });

        let sent = sent_rx.recv().await.unwrap();
        assert_eq!(sent.id, "c1");
        assert_eq!(sent.command_type, "snapshot");

        router
            .handle_extension_response(&session_id, CommandResponse::ok("c1", Some(json!({"ok": true}))))
            .await;

        let response = submit.await.unwrap();
        assert!(response.success);
    }

    #[tokio::test]
    async fn navigate_translates_to_open() {
        let (sent_tx, mut sent_rx) = mpsc::unbounded_channel();
        let (router, _registry, session_id) = attached_router(sent_tx).await;

        let router_clone = Arc::clone(&router);
        let session_for_task = session_id.clone();
        tokio::spawn(async move {
            router_clone
                .submit_command(command("c1", &session_for_task, CommandType::Navigate))
                .await
        });

        let sent = sent_rx.recv().await.unwrap();
        assert_eq!(sent.command_type, "open");
    }

    #[tokio::test]
    async fn tab_new_collapses_to_tab_with_action() {
        let (sent_tx, mut sent_rx) = mpsc::unbounded_channel();
        let (router, _registry, session_id) = attached_router(sent_tx).await;

        let router_clone = Arc::clone(&router);
        let session_for_task = session_id.clone();
        tokio::spawn(async move {
            router_clone
                .submit_command(command("c1", &session_for_task, CommandType::TabNew))
                .await
        });

        let sent = sent_rx.recv().await.unwrap();
        assert_eq!(sent.command_type, "tab");
        assert_eq!(sent.params.unwrap()["action"], "new");
    }

    #[tokio::test]
    async fn second_command_queues_until_first_completes() {
        let (sent_tx, mut sent_rx) = mpsc::unbounded_channel();
        let (router, _registry, session_id) = attached_router(sent_tx).await;

        let r1 = Arc::clone(&router);
        let s1 = session_id.clone();
        let first = tokio::spawn(async move {
            r1.submit_command(command("c1", &s1, CommandType::Snapshot)).await
        });
        let first_sent = sent_rx.recv().await.unwrap();
        assert_eq!(first_sent.id, "c1");

        let r2 = Arc::clone(&router);
        let s2 = session_id.clone();
        let second = tokio::spawn(async move {
            r2.submit_command(command("c2", &s2, CommandType::Snapshot)).await
        });

        // c2 must not reach the extension until c1's response is handled.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(sent_rx.try_recv().is_err());

        router
            .handle_extension_response(&session_id, CommandResponse::ok("c1", None))
            .await;
        assert!(first.await.unwrap().success);

        let second_sent = sent_rx.recv().await.unwrap();
        assert_eq!(second_sent.id, "c2");

        router
            .handle_extension_response(&session_id, CommandResponse::ok("c2", None))
            .await;
        assert!(second.await.unwrap().success);
    }

    #[tokio::test]
    async fn command_timeout_fails_and_drains_queue() {
        let (sent_tx, mut sent_rx) = mpsc::unbounded_channel();
        let registry = Arc::new(SessionRegistry::new());
        let session = registry.create(None, 0).await;
        let (tx, _rx) = mpsc::unbounded_channel();
        registry
            .attach_extension(&session.id, crate::session::ExtensionHandle { window_id: 1, sender: tx })
            .await
            .unwrap();

        let sender = Arc::new(RecordingSender {
            sent: sent_tx,
            always_connected: Arc::new(std::sync::Mutex::new(true)),
        });
        let fast_timeout = RouterConfig {
            browser_launch_timeout_ms: 200,
            command_timeout_ms: 30,
        };
        let router = Router::new(Arc::clone(&registry), sender, Arc::new(NeverLaunches), fast_timeout);

        let r1 = Arc::clone(&router);
        let session_id = session.id.clone();
        let sid1 = session_id.clone();
        let first = tokio::spawn(async move {
            r1.submit_command(command("c1", &sid1, CommandType::Snapshot)).await
        });
        sent_rx.recv().await.unwrap();

        let r2 = Arc::clone(&router);
        let sid2 = session_id.clone();
        let second = tokio::spawn(async move {
            r2.submit_command(command("c2", &sid2, CommandType::Snapshot)).await
        });

        let first_response = first.await.unwrap();
        assert!(!first_response.success);
        assert_eq!(first_response.error.as_deref(), Some("Command timed out"));

        let second_sent = sent_rx.recv().await.unwrap();
        assert_eq!(second_sent.id, "c2");

        router
            .handle_extension_response(&session_id, CommandResponse::ok("c2", None))
            .await;
        assert!(second.await.unwrap().success);
    }

    #[tokio::test]
    async fn disconnect_fails_pending_and_queued_commands() {
        let (sent_tx, mut sent_rx) = mpsc::unbounded_channel();
        let (router, _registry, session_id) = attached_router(sent_tx).await;

        let r1 = Arc::clone(&router);
        let s1 = session_id.clone();
        let first = tokio::spawn(async move {
            r1.submit_command(command("c1", &s1, CommandType::Snapshot)).await
        });
        sent_rx.recv().await.unwrap();

        let r2 = Arc::clone(&router);
        let s2 = session_id.clone();
        let second = tokio::spawn(async move {
            r2.submit_command(command("c2", &s2, CommandType::Snapshot)).await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        router.handle_extension_disconnected(&session_id).await;

        let first_response = first.await.unwrap();
        let second_response = second.await.unwrap();
        assert_eq!(first_response.error.as_deref(), Some("Extension disconnected"));
        assert_eq!(second_response.error.as_deref(), Some("Extension disconnected"));
    }

    #[tokio::test]
    async fn cancel_all_fails_everything_with_shutdown_error() {
        let (sent_tx, mut sent_rx) = mpsc::unbounded_channel();
        let (router, _registry, session_id) = attached_router(sent_tx).await;

        let r1 = Arc::clone(&router);
        let s1 = session_id.clone();
        let first = tokio::spawn(async move {
            r1.submit_command(command("c1", &s1, CommandType::Snapshot)).await
        });
        sent_rx.recv().await.unwrap();

        router.cancel_all().await;

        let response = first.await.unwrap();
        assert_eq!(
            response.error.as_deref(),
            Some("Command cancelled: daemon shutting down")
        );
    }

    #[tokio::test]
    async fn browser_launch_failure_reports_launch_failed() {
        let registry = Arc::new(SessionRegistry::new());
        let session = registry.create(None, 0).await;
        let (tx, _rx) = mpsc::unbounded_channel();
        let sender = Arc::new(RecordingSender {
            sent: tx,
            always_connected: Arc::new(std::sync::Mutex::new(false)),
        });
        let router = Router::new(Arc::clone(&registry), sender, Arc::new(FailingSupervisor), config());

        let response = router
            .submit_command(command("c1", &session.id, CommandType::Snapshot))
            .await;
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("Failed to launch browser"));

        let fetched = registry.get(&session.id).await.unwrap();
        assert_eq!(fetched.state, SessionState::Disconnected);
    }

    #[tokio::test]
    async fn send_failure_completes_command_without_installing_pending() {
        let registry = Arc::new(SessionRegistry::new());
        let session = registry.create(None, 0).await;
        let (tx, _rx) = mpsc::unbounded_channel();
        registry
            .attach_extension(&session.id, crate::session::ExtensionHandle { window_id: 1, sender: tx })
            .await
            .unwrap();
        let (sent_tx, _sent_rx) = mpsc::unbounded_channel();
        let connected_flag = Arc::new(std::sync::Mutex::new(false));
        let sender = Arc::new(RecordingSender {
            sent: sent_tx,
            always_connected: connected_flag,
        });
        let router = Router::new(Arc::clone(&registry), sender, Arc::new(NeverLaunches), config());

        let response = router
            .submit_command(command("c1", &session.id, CommandType::Snapshot))
            .await;
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("Failed to send command to extension"));
    }
}
