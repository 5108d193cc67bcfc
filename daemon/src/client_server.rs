//! Local client server.
//!
//! Unix domain socket, one request/response per connection: read exactly
//! one line-delimited frame, dispatch, write exactly one reply, close.
//! Stale socket files are removed before binding and permissions are
//! tightened to 0700 so only the owning user can connect.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use browserd_protocol::codec::{self, CodecError};
use browserd_protocol::{ClientRequest, ClientResponse, SessionSummary};

use crate::router::Router;
use crate::session::{SessionRegistry, SessionState};

pub struct ClientServer {
    socket_path: PathBuf,
    registry: Arc<SessionRegistry>,
    router: Arc<Router>,
    ws_port: u16,
}

impl ClientServer {
    pub fn new(
        socket_path: PathBuf,
        registry: Arc<SessionRegistry>,
        router: Arc<Router>,
        ws_port: u16,
    ) -> Arc<Self> {
        Arc::new(Self { socket_path, registry, router, ws_port })
    }

    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) -> std::io::Result<()> {
        ensure_parent_dir(&self.socket_path)?;
        let _ = std::fs::remove_file(&self.socket_path);

        let listener = UnixListener::bind(&self.socket_path)?;
        set_socket_permissions(&self.socket_path)?;
        info!(path = %self.socket_path.display(), "local client socket listening");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("local client accept loop stopping");
                    break;
                }
                accepted = listener.accept() => {
                    let (stream, _) = accepted?;
                    let server = Arc::clone(&self);
                    tokio::spawn(async move {
                        server.handle_connection(stream).await;
                    });
                }
            }
        }

        let _ = std::fs::remove_file(&self.socket_path);
        Ok(())
    }

    async fn handle_connection(&self, stream: UnixStream) {
        let (read_half, mut writer) = stream.into_split();
        let mut reader = tokio::io::BufReader::new(read_half);

        let request = match codec::read_line_frame::<_, ClientRequest>(&mut reader).await {
            Ok(Some(request)) => request,
            Ok(None) => return,
            Err(err) => {
                let _ = codec::write_line_frame(
                    &mut writer,
                    &ClientResponse::Error { message: format_protocol_error(&err) },
                )
                .await;
                return;
            }
        };

        let response = self.dispatch(request).await;
        if let Err(err) = codec::write_line_frame(&mut writer, &response).await {
            debug!(%err, "failed to write client response");
        }
    }

    async fn dispatch(&self, request: ClientRequest) -> ClientResponse {
        match request {
            ClientRequest::Ping => ClientResponse::Pong,

            ClientRequest::Command(command) => {
                let response = self.router.submit_command(command).await;
                ClientResponse::Response(response)
            }

            ClientRequest::GetEndpoint => ClientResponse::Endpoint {
                ip: "127.0.0.1".to_string(),
                port: self.ws_port,
            },

            ClientRequest::RegisterExtension => {
                let session = self.create_or_reuse_awaiting().await;
                ClientResponse::Registration {
                    session_id: session.id,
                    ip: "127.0.0.1".to_string(),
                    port: self.ws_port,
                }
            }

            ClientRequest::ListSessions => {
                let sessions = self
                    .registry
                    .list_all()
                    .await
                    .into_iter()
                    .map(|s| SessionSummary {
                        id: s.id,
                        name: s.name.unwrap_or_default(),
                        state: s.state.as_str().to_string(),
                        created_at_unix_ms: s.created_at_unix_ms,
                    })
                    .collect();
                ClientResponse::SessionList(sessions)
            }

            ClientRequest::CloseSession { session_id } => {
                // Drain the session's commands before flipping its state so
                // the terminal `closed` state is the last write. Using
                // `handle_extension_disconnected` here would reset the state
                // to `disconnected` right after `close()` sets it, making a
                // closed session look reattachable again.
                self.router.handle_session_closing(&session_id).await;
                match self.registry.close(&session_id).await {
                    Ok(()) => ClientResponse::Pong,
                    Err(_) => ClientResponse::Error { message: "Session not found".to_string() },
                }
            }
        }
    }

    async fn create_or_reuse_awaiting(&self) -> crate::session::Session {
        if let Some(existing) = self.registry.list_awaiting_extension().await.into_iter().next() {
            return existing;
        }
        let now_ms = now_unix_ms();
        let session = self
            .registry
            .create(Some(format!("pending-{now_ms}")), now_ms)
            .await;
        let _ = self.registry.set_state(&session.id, SessionState::AwaitingExtension).await;
        session
    }
}

fn format_protocol_error(err: &CodecError) -> String {
    match err {
        CodecError::FrameTooLarge(_) => "frame too large".to_string(),
        CodecError::InvalidUtf8 => "invalid utf-8 in frame".to_string(),
        CodecError::InvalidJson(_) => "malformed request".to_string(),
        CodecError::Eof | CodecError::Io(_) => "i/o error".to_string(),
    }
}

fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

fn now_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
