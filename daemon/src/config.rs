//! Daemon configuration, layered lowest to highest precedence:
//! built-in defaults → optional TOML file → environment variables
//! (`BROWSERD_*`) → CLI flags (applied by the caller after [`load`]).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

fn default_ws_port() -> u16 {
    9222
}

fn default_local_socket_path() -> String {
    "/tmp/browserd.sock".to_string()
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

fn default_heartbeat_timeout_ms() -> u64 {
    5_000
}

fn default_browser_launch_timeout_ms() -> u64 {
    30_000
}

fn default_command_timeout_ms() -> u64 {
    30_000
}

fn default_browser_binary() -> String {
    "chromium".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Daemon configuration: timeouts, listen addresses, and the browser
/// binary to launch, plus the ambient `log_level` knob.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ws_port: u16,
    pub local_socket_path: String,
    pub heartbeat_interval_ms: u64,
    pub heartbeat_timeout_ms: u64,
    pub browser_launch_timeout_ms: u64,
    pub command_timeout_ms: u64,
    pub browser_binary: String,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ws_port: default_ws_port(),
            local_socket_path: default_local_socket_path(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            browser_launch_timeout_ms: default_browser_launch_timeout_ms(),
            command_timeout_ms: default_command_timeout_ms(),
            browser_binary: default_browser_binary(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from an explicit file path, or else the default
    /// user config location if it exists, then apply `BROWSERD_*`
    /// environment overrides. Never errors on a missing file — only a
    /// present-but-unparseable one.
    pub fn load(explicit_path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match explicit_path {
            Some(path) => Self::from_toml_file(path)?,
            None => match Self::default_config_path() {
                Some(path) if path.exists() => Self::from_toml_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn from_toml_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading config file {}: {e}", path.display()))?;
        let config: Self = toml::from_str(&text)
            .map_err(|e| anyhow::anyhow!("parsing config file {}: {e}", path.display()))?;
        Ok(config)
    }

    fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("browserd").join("config.toml"))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("BROWSERD_WS_PORT") {
            if let Ok(port) = v.parse() {
                self.ws_port = port;
            }
        }
        if let Ok(v) = std::env::var("BROWSERD_LOCAL_SOCKET_PATH") {
            self.local_socket_path = v;
        }
        if let Ok(v) = std::env::var("BROWSERD_HEARTBEAT_INTERVAL_MS") {
            if let Ok(ms) = v.parse() {
                self.heartbeat_interval_ms = ms;
            }
        }
        if let Ok(v) = std::env::var("BROWSERD_HEARTBEAT_TIMEOUT_MS") {
            if let Ok(ms) = v.parse() {
                self.heartbeat_timeout_ms = ms;
            }
        }
        if let Ok(v) = std::env::var("BROWSERD_BROWSER_LAUNCH_TIMEOUT_MS") {
            if let Ok(ms) = v.parse() {
                self.browser_launch_timeout_ms = ms;
            }
        }
        if let Ok(v) = std::env::var("BROWSERD_COMMAND_TIMEOUT_MS") {
            if let Ok(ms) = v.parse() {
                self.command_timeout_ms = ms;
            }
        }
        if let Ok(v) = std::env::var("BROWSERD_BROWSER_BINARY") {
            self.browser_binary = v;
        }
        if let Ok(v) = std::env::var("BROWSERD_LOG_LEVEL") {
            self.log_level = v;
        }
    }
}
