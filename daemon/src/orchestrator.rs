//! Daemon orchestrator.
//!
//! Builds the registry, channel server, router, supervisor, and client
//! server, wires their cross-references, and binds sockets in
//! deterministic order — the extension channel and browser supervisor
//! before the local client socket, so an external caller can never reach
//! a daemon that is not yet able to service it.

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::channel::ChannelServer;
use crate::client_server::ClientServer;
use crate::config::Config;
use crate::error::DaemonError;
use crate::router::{ExtensionSender, Router, RouterConfig};
use crate::session::SessionRegistry;
use crate::supervisor::ProcessSupervisor;

pub struct Daemon {
    registry: Arc<SessionRegistry>,
    channel_server: Arc<ChannelServer>,
    router: Arc<Router>,
    client_server: Arc<ClientServer>,
    config: Config,
}

impl Daemon {
    pub fn build(config: Config) -> Self {
        let registry = Arc::new(SessionRegistry::new());

        let channel_server = ChannelServer::new(
            Arc::clone(&registry),
            config.heartbeat_interval_ms,
            config.heartbeat_timeout_ms,
        );

        let user_data_root = std::env::temp_dir().join("browserd-sessions");
        let supervisor = Arc::new(ProcessSupervisor::new(
            config.browser_binary.clone(),
            config.ws_port,
            user_data_root,
        ));

        let router = Router::new(
            Arc::clone(&registry),
            channel_server.clone() as Arc<dyn ExtensionSender>,
            supervisor,
            RouterConfig {
                browser_launch_timeout_ms: config.browser_launch_timeout_ms,
                command_timeout_ms: config.command_timeout_ms,
            },
        );
        channel_server.bind_router(Arc::clone(&router));

        let client_server = ClientServer::new(
            PathBuf::from(&config.local_socket_path),
            Arc::clone(&registry),
            Arc::clone(&router),
            config.ws_port,
        );

        Self { registry, channel_server, router, client_server, config }
    }

    /// Runs until `shutdown` is cancelled, then drains in-flight work and
    /// returns. Binds the extension channel first, the client socket
    /// last, so a client connecting to the local socket always finds a
    /// daemon that can already accept extension connections.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), DaemonError> {
        let channel_shutdown = shutdown.child_token();
        let channel_server = Arc::clone(&self.channel_server);
        let ws_port = self.config.ws_port;
        let channel_task = tokio::spawn(async move {
            channel_server.run(ws_port, channel_shutdown).await
        });

        let client_shutdown = shutdown.child_token();
        let client_server = Arc::clone(&self.client_server);
        let client_task = tokio::spawn(async move {
            client_server.run(client_shutdown).await
        });

        info!(
            ws_port = self.config.ws_port,
            local_socket_path = %self.config.local_socket_path,
            "browserd daemon started"
        );

        shutdown.cancelled().await;
        info!("shutdown requested, stopping daemon");

        self.router.cancel_all().await;

        let channel_result = channel_task.await;
        let client_result = client_task.await;

        match channel_result {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(DaemonError::ChannelListenerBind(err)),
            Err(_) => {}
        }
        match client_result {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(DaemonError::ClientSocketBind(err)),
            Err(_) => {}
        }

        Ok(())
    }

    /// The session registry, exposed for the host-messaging query path
    /// and integration tests that need to observe daemon state directly.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }
}
