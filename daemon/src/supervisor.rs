//! Browser supervisor.
//!
//! A thin collaborator boundary over `tokio::process`: launches a
//! configured browser binary per session with its own user-data
//! directory and remote-debugging port, tracks the child's pid, and
//! reaps it on kill or unexpected exit so `has_browser` reflects reality
//! instead of stale bookkeeping — the same pid-tracking discipline the
//! pack's agent-browser manager uses for its per-session daemons.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::router::BrowserSupervisor;

pub struct ProcessSupervisor {
    browser_binary: String,
    ws_port: u16,
    user_data_root: PathBuf,
    children: Mutex<HashMap<String, Child>>,
}

impl ProcessSupervisor {
    pub fn new(browser_binary: String, ws_port: u16, user_data_root: PathBuf) -> Self {
        Self {
            browser_binary,
            ws_port,
            user_data_root,
            children: Mutex::new(HashMap::new()),
        }
    }

    fn user_data_dir(&self, session_id: &str) -> PathBuf {
        self.user_data_root.join(session_id)
    }
}

#[async_trait]
impl BrowserSupervisor for ProcessSupervisor {
    async fn has_browser(&self, session_id: &str) -> bool {
        let mut children = self.children.lock().await;
        match children.get_mut(session_id) {
            Some(child) => match child.try_wait() {
                Ok(Some(_status)) => {
                    children.remove(session_id);
                    false
                }
                Ok(None) => true,
                Err(_) => false,
            },
            None => false,
        }
    }

    async fn launch_browser(&self, session_id: &str) -> bool {
        if self.has_browser(session_id).await {
            return true;
        }

        let user_data_dir = self.user_data_dir(session_id);
        if let Err(err) = std::fs::create_dir_all(&user_data_dir) {
            warn!(session_id, %err, "failed to create browser user-data directory");
            return false;
        }

        let spawned = Command::new(&self.browser_binary)
            .arg(format!("--remote-debugging-port={}", self.ws_port))
            .arg(format!("--user-data-dir={}", user_data_dir.display()))
            .arg("--no-first-run")
            .kill_on_drop(true)
            .spawn();

        match spawned {
            Ok(child) => {
                info!(session_id, pid = child.id(), "browser launched");
                self.children.lock().await.insert(session_id.to_string(), child);
                true
            }
            Err(err) => {
                warn!(session_id, %err, "failed to launch browser");
                false
            }
        }
    }

    async fn kill_browser(&self, session_id: &str) {
        let child = self.children.lock().await.remove(session_id);
        if let Some(mut child) = child {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
    }
}
