//! Extension channel server.
//!
//! One TCP accept loop, one task per connection. Each connection task
//! owns its socket outright and multiplexes heartbeat timers, inbound
//! frames, and outbound commands handed to it through the session
//! registry's [`ChannelOutbound`] sender, via a single `select!` over the
//! ping deadline, outbound queue, and inbound frames.

use std::sync::{Arc, OnceLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use browserd_protocol::codec::{self, CodecError};
use browserd_protocol::{CloseCode, ExtensionCommand, ExtensionInbound, ExtensionOutbound};

use crate::router::{ExtensionSender, Router};
use crate::session::{ChannelOutbound, ExtensionHandle, SessionRegistry, SessionState};

pub struct ChannelServer {
    registry: Arc<SessionRegistry>,
    router: OnceLock<Arc<Router>>,
    heartbeat_interval_ms: u64,
    heartbeat_timeout_ms: u64,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ChannelServer {
    pub fn new(
        registry: Arc<SessionRegistry>,
        heartbeat_interval_ms: u64,
        heartbeat_timeout_ms: u64,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            router: OnceLock::new(),
            heartbeat_interval_ms,
            heartbeat_timeout_ms,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Late-bind the router. Must be called once, before `run`, since the
    /// router and channel server each need a handle to the other and
    /// neither can be constructed first without it (see the orchestrator
    /// wiring note).
    pub fn bind_router(&self, router: Arc<Router>) {
        if self.router.set(router).is_err() {
            panic!("ChannelServer::bind_router called more than once");
        }
    }

    fn router(&self) -> Arc<Router> {
        self.router
            .get()
            .cloned()
            .expect("ChannelServer used before bind_router")
    }

    pub async fn run(self: Arc<Self>, port: u16, shutdown: CancellationToken) -> std::io::Result<()> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        info!(port, "extension channel listening");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("extension channel accept loop stopping");
                    break;
                }
                accepted = listener.accept() => {
                    let (stream, peer) = accepted?;
                    debug!(%peer, "extension connected");
                    let server = Arc::clone(&self);
                    let handle = tokio::spawn(async move {
                        server.handle_connection(stream).await;
                    });
                    self.tasks.lock().await.push(handle);
                }
            }
        }

        self.close_all(CloseCode::Normal).await;
        self.join_all().await;
        Ok(())
    }

    /// Close every attached extension channel with the given code.
    pub async fn close_all(&self, code: CloseCode) {
        for id in self.registry.all_ids().await {
            if let Some(handle) = self.registry.extension_handle(&id).await {
                let _ = handle.sender.send(ChannelOutbound::Close(code));
            }
            let _ = self.registry.detach_extension(&id).await;
        }
    }

    async fn join_all(&self) {
        let handles: Vec<_> = self.tasks.lock().await.drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
    }

    async fn handle_connection(self: Arc<Self>, stream: tokio::net::TcpStream) {
        let (read_half, mut writer) = stream.into_split();
        let mut reader = tokio::io::BufReader::new(read_half);

        let register = match codec::read_line_frame::<_, Value>(&mut reader).await {
            Ok(Some(value)) => value,
            _ => return,
        };
        let register = match ExtensionInbound::parse(&register) {
            ExtensionInbound::Register(msg) => msg,
            _ => {
                let _ = write_close(&mut writer, CloseCode::ProtocolError).await;
                return;
            }
        };

        let session_id = self
            .resolve_session(register.window_id, register.cached_session_id.as_deref())
            .await;

        if let Some(existing) = self.registry.extension_handle(&session_id).await {
            let _ = existing
                .sender
                .send(ChannelOutbound::Close(CloseCode::NewConnectionForSession));
            let _ = self.registry.detach_extension(&session_id).await;
        }

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
        if self
            .registry
            .attach_extension(
                &session_id,
                ExtensionHandle { window_id: register.window_id, sender: outbound_tx },
            )
            .await
            .is_err()
        {
            warn!(session_id, "lost attach race, dropping connection");
            return;
        }
        let _ = self.registry.set_state(&session_id, SessionState::Connected).await;

        if codec::write_line_frame(
            &mut writer,
            &ExtensionOutbound::SessionAssigned { session_id: session_id.clone() },
        )
        .await
        .is_err()
        {
            let _ = self.registry.detach_extension(&session_id).await;
            return;
        }

        self.router().on_extension_connected(&session_id).await;

        self.connection_loop(&session_id, &mut reader, &mut writer, &mut outbound_rx)
            .await;

        let _ = self.registry.detach_extension(&session_id).await;
        self.router().handle_extension_disconnected(&session_id).await;
    }

    async fn connection_loop(
        &self,
        session_id: &str,
        reader: &mut tokio::io::BufReader<tokio::net::tcp::OwnedReadHalf>,
        writer: &mut tokio::net::tcp::OwnedWriteHalf,
        outbound_rx: &mut mpsc::UnboundedReceiver<ChannelOutbound>,
    ) {
        let heartbeat_timeout = Duration::from_millis(self.heartbeat_timeout_ms);
        let mut heartbeat_tick = tokio::time::interval(Duration::from_millis(self.heartbeat_interval_ms));
        heartbeat_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        heartbeat_tick.tick().await; // first tick fires immediately; consume it

        let mut ping_deadline: Option<Instant> = None;

        loop {
            tokio::select! {
                _ = heartbeat_tick.tick() => {
                    if ping_deadline.is_none() {
                        if codec::write_line_frame(writer, &ExtensionOutbound::Ping).await.is_err() {
                            break;
                        }
                        ping_deadline = Some(Instant::now() + heartbeat_timeout);
                    }
                }

                _ = async { tokio::time::sleep_until(ping_deadline.unwrap()).await }, if ping_deadline.is_some() => {
                    warn!(session_id, "heartbeat timeout, closing channel");
                    let _ = write_close(writer, CloseCode::HeartbeatTimeout).await;
                    break;
                }

                outbound = outbound_rx.recv() => {
                    match outbound {
                        Some(ChannelOutbound::Command(cmd)) => {
                            if codec::write_line_frame(writer, &cmd).await.is_err() {
                                break;
                            }
                        }
                        Some(ChannelOutbound::Control(ctrl)) => {
                            if codec::write_line_frame(writer, &ctrl).await.is_err() {
                                break;
                            }
                        }
                        Some(ChannelOutbound::Close(code)) => {
                            let _ = write_close(writer, code).await;
                            break;
                        }
                        None => break,
                    }
                }

                frame = codec::read_line_frame::<_, Value>(reader) => {
                    match frame {
                        Ok(Some(value)) => match ExtensionInbound::parse(&value) {
                            ExtensionInbound::Ping => {
                                let _ = codec::write_line_frame(writer, &ExtensionOutbound::Pong).await;
                            }
                            ExtensionInbound::Pong => {
                                ping_deadline = None;
                            }
                            ExtensionInbound::Response(response) => {
                                self.router().handle_extension_response(session_id, response).await;
                            }
                            ExtensionInbound::Register(_) => {
                                debug!(session_id, "ignoring re-registration on an active channel");
                            }
                            ExtensionInbound::Unrecognized => {
                                debug!(session_id, "dropping unrecognized extension message");
                            }
                        },
                        Ok(None) => break,
                        Err(CodecError::FrameTooLarge(n)) => {
                            warn!(session_id, bytes = n, "extension frame too large, closing");
                            let _ = write_close(writer, CloseCode::ProtocolError).await;
                            break;
                        }
                        Err(err) => {
                            debug!(session_id, %err, "dropping malformed extension frame");
                        }
                    }
                }
            }
        }
    }

    /// Resolve a registering connection to a session id using the
    /// three-step rule: prefer the oldest session awaiting an extension,
    /// then a still-live cached session id, then mint a fresh session.
    async fn resolve_session(&self, window_id: u64, cached_session_id: Option<&str>) -> String {
        if let Some(session) = self.registry.list_awaiting_extension().await.into_iter().next() {
            let _ = self.registry.set_window_id(&session.id, window_id).await;
            return session.id;
        }

        if let Some(cached) = cached_session_id {
            if let Some(session) = self.registry.get(cached).await {
                if session.state != SessionState::Closed {
                    let _ = self.registry.set_window_id(&session.id, window_id).await;
                    return session.id;
                }
            }
        }

        let now_ms = now_unix_ms();
        let session = self
            .registry
            .create(Some(format!("window-{now_ms}")), now_ms)
            .await;
        let _ = self.registry.set_window_id(&session.id, window_id).await;
        session.id
    }
}

#[async_trait]
impl ExtensionSender for ChannelServer {
    async fn send_command(&self, session_id: &str, command: ExtensionCommand) -> bool {
        match self.registry.extension_handle(session_id).await {
            Some(handle) => handle.sender.send(ChannelOutbound::Command(command)).is_ok(),
            None => false,
        }
    }
}

async fn write_close(
    writer: &mut tokio::net::tcp::OwnedWriteHalf,
    code: CloseCode,
) -> Result<(), CodecError> {
    codec::write_line_frame(
        writer,
        &json!({"type": "close", "code": code.code(), "reason": code.reason()}),
    )
    .await
}

fn now_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::{BrowserSupervisor, RouterConfig};
    use serde_json::{json, Value as JsonValue};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpStream;

    struct NoopSupervisor;

    #[async_trait]
    impl BrowserSupervisor for NoopSupervisor {
        async fn has_browser(&self, _session_id: &str) -> bool {
            true
        }
        async fn launch_browser(&self, _session_id: &str) -> bool {
            true
        }
        async fn kill_browser(&self, _session_id: &str) {}
    }

    async fn start_server(
        heartbeat_interval_ms: u64,
        heartbeat_timeout_ms: u64,
    ) -> (Arc<ChannelServer>, Arc<SessionRegistry>, u16, CancellationToken) {
        let registry = Arc::new(SessionRegistry::new());
        let server = ChannelServer::new(Arc::clone(&registry), heartbeat_interval_ms, heartbeat_timeout_ms);
        let router = Router::new(
            Arc::clone(&registry),
            server.clone() as Arc<dyn ExtensionSender>,
            Arc::new(NoopSupervisor),
            RouterConfig { browser_launch_timeout_ms: 1000, command_timeout_ms: 1000 },
        );
        server.bind_router(router);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let shutdown = CancellationToken::new();
        let server_for_task = Arc::clone(&server);
        let shutdown_for_task = shutdown.clone();
        tokio::spawn(async move {
            let _ = server_for_task.run(port, shutdown_for_task).await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        (server, registry, port, shutdown)
    }

    async fn read_json_line(reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>) -> JsonValue {
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        serde_json::from_str(line.trim()).unwrap()
    }

    #[tokio::test]
    async fn registration_with_no_awaiting_session_creates_one() {
        let (_server, _registry, port, _shutdown) = start_server(10_000, 10_000).await;

        let stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        write_half
            .write_all(b"{\"type\":\"register\",\"windowId\":1}\n")
            .await
            .unwrap();

        let reply = read_json_line(&mut reader).await;
        assert_eq!(reply["type"], "session_assigned");
        assert!(reply["sessionId"].as_str().unwrap().starts_with("sess-"));
    }

    #[tokio::test]
    async fn awaiting_extension_session_wins_over_cached_id() {
        let (_server, registry, port, _shutdown) = start_server(10_000, 10_000).await;

        let cached = registry.create(None, 1).await;
        registry.set_state(&cached.id, SessionState::Disconnected).await.unwrap();

        let awaiting = registry.create(None, 2).await;
        registry
            .set_state(&awaiting.id, SessionState::AwaitingExtension)
            .await
            .unwrap();

        let stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let register = json!({"type": "register", "windowId": 5, "cachedSessionId": cached.id});
        write_half
            .write_all(format!("{}\n", register).as_bytes())
            .await
            .unwrap();

        let reply = read_json_line(&mut reader).await;
        assert_eq!(reply["sessionId"], awaiting.id);
    }

    #[tokio::test]
    async fn heartbeat_timeout_closes_channel_and_notifies_router() {
        let (_server, registry, port, _shutdown) = start_server(30, 30).await;

        let stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        write_half
            .write_all(b"{\"type\":\"register\",\"windowId\":1}\n")
            .await
            .unwrap();
        let assigned = read_json_line(&mut reader).await;
        let session_id = assigned["sessionId"].as_str().unwrap().to_string();

        // Never reply to pings; within interval+timeout the server closes.
        let close = read_json_line(&mut reader).await;
        assert_eq!(close["type"], "ping");
        let close = read_json_line(&mut reader).await;
        assert_eq!(close["type"], "close");
        assert_eq!(close["code"], 4002);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!registry.has_extension(&session_id).await);
        let session = registry.get(&session_id).await.unwrap();
        assert_eq!(session.state, SessionState::Disconnected);
    }
}
