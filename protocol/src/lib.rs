//! Wire protocol types and framing shared by the browserd daemon.
//!
//! This crate has no knowledge of sessions, routing, or process
//! management — it only knows how bytes on the wire map to typed Rust
//! values. Splitting it out keeps the daemon crate free to depend on it
//! without pulling tokio's networking stack into anything that only needs
//! the message shapes (e.g. a future CLI).

pub mod client;
pub mod codec;
pub mod extension;

pub use client::{ClientRequest, ClientResponse, Command, CommandResponse, CommandType, SessionSummary};
pub use extension::{CloseCode, ExtensionCommand, ExtensionInbound, ExtensionOutbound, RegisterMessage};
