pub mod collaborators;
#[allow(clippy::module_inception)]
pub mod router;

pub use collaborators::{BrowserSupervisor, ExtensionSender};
pub use router::{Router, RouterConfig};
