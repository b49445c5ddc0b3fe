//! Plugin manifest: the `plugin.toml` file a plugin directory must carry.

use std::path::Path;

use serde::{Deserialize, Serialize};

use xkit_core::ids::{CommandName, EventTypeName, PluginName};

use crate::error::{PluginError, PluginResult};

/// Declares a plugin's identity and the commands/events it contributes.
///
/// Deliberately narrower than a general-purpose capability manifest: a
/// plugin here is always a named in-process factory, never a WASM module,
/// connector, or uplink. Those concerns belong to the MCP servers a plugin
/// may itself talk to, not to the manifest describing the plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Unique plugin name.
    pub name: PluginName,
    /// Free-form semantic version string, not currently enforced.
    pub version: String,
    /// Key under which a factory was registered with the manager.
    pub entry_point: String,
    /// Commands this plugin will register on load.
    #[serde(default)]
    pub declared_commands: Vec<CommandName>,
    /// Event types this plugin publishes or subscribes to.
    #[serde(default)]
    pub declared_events: Vec<EventTypeName>,
    /// Other plugins that must already be loaded before this one.
    #[serde(default)]
    pub requires: Vec<PluginName>,
}

impl PluginManifest {
    /// Parse a manifest from its TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::ManifestParse`] if `text` is not valid TOML or
    /// does not match the manifest shape.
    pub fn parse(path: &Path, text: &str) -> PluginResult<Self> {
        toml::from_str(text).map_err(|err| PluginError::ManifestParse {
            path: path.display().to_string(),
            message: err.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn parses_a_minimal_manifest() {
        let text = r#"
            name = "greeter"
            version = "0.1.0"
            entry_point = "greeter"
            declared_commands = ["greet"]
        "#;
        let manifest = PluginManifest::parse(&PathBuf::from("plugin.toml"), text).unwrap();
        assert_eq!(manifest.name.as_str(), "greeter");
        assert_eq!(manifest.declared_commands.len(), 1);
        assert!(manifest.requires.is_empty());
    }

    #[test]
    fn rejects_malformed_toml() {
        let err = PluginManifest::parse(&PathBuf::from("plugin.toml"), "not = [valid").unwrap_err();
        assert!(matches!(err, PluginError::ManifestParse { .. }));
    }
}
