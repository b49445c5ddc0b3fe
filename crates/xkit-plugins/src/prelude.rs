//! Convenience re-exports for consumers of this crate.

pub use crate::discovery::{discover, DiscoveredPlugin};
pub use crate::error::{PluginError, PluginResult};
pub use crate::manager::PluginManager;
pub use crate::manifest::PluginManifest;
pub use crate::plugin::{CommandOutcome, FactoryRegistry, Plugin, PluginFactory, PluginServices};
