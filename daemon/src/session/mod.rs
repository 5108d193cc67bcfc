pub mod registry;
pub mod types;

pub use registry::{ChannelOutbound, ExtensionHandle, RegistryError, SessionRegistry};
pub use types::{Session, SessionState};
