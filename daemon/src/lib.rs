//! Library surface for the `browserd` binary and its integration tests.
//!
//! `main.rs` is a thin CLI shell around [`orchestrator::Daemon`] and
//! [`query::run`]; everything else lives here so both the binary and
//! `tests/` can drive the daemon without going through a subprocess.

pub mod channel;
pub mod client_server;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod query;
pub mod router;
pub mod session;
pub mod supervisor;

pub use config::Config;
pub use error::DaemonError;
pub use orchestrator::Daemon;
