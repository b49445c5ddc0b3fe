//! The `Plugin` trait and the in-process factory registry that constructs
//! instances of it.
//!
//! Dynamic loading of foreign code (`dlopen`/FFI) would require
//! `unsafe_code`, which this crate denies outright. Instead a plugin is a
//! Rust type compiled into the binary and registered under a name; the
//! manifest's `entry_point` looks it up at load time the same way a real
//! out-of-process loader would look up a shared library. A plugin that
//! wants true process isolation runs as an MCP server instead and is
//! reached through `xkit-mcp`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use xkit_core::config::RuntimeConfig;
use xkit_core::ids::{CommandName, PluginName};
use xkit_events::bus::EventBus;
use xkit_mcp::client::McpClient;

/// The result of handling a dispatched command.
pub type CommandOutcome = Result<Value, String>;

/// The narrow view of the kernel's ports a plugin is given at load time.
///
/// Deliberately smaller than the full set of kernel ports: a plugin gets
/// the event bus, the MCP client, and a read-only snapshot of
/// configuration, never the raw `Config`/`Logger`/`Clock`/`Process`/
/// `Http`/`Filesystem` ports themselves. There are no global singletons a
/// plugin can reach around this struct to get at.
#[derive(Clone)]
pub struct PluginServices {
    /// Handle for publishing events and subscribing to them.
    pub event_bus: EventBus,
    /// Handle for calling tools on registered MCP servers. `None` when no
    /// server table is configured.
    pub mcp_client: Option<McpClient>,
    /// Read-only configuration snapshot taken at kernel startup.
    pub config: Arc<RuntimeConfig>,
}

/// A loaded extension unit.
///
/// Implementors own their own state; the manager never reaches into it
/// directly, only through this trait's methods.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// The plugin's own name, matching its manifest.
    fn name(&self) -> &PluginName;

    /// Called once after construction, before any command is dispatched.
    ///
    /// `services` is the plugin's only way to reach the event bus, the MCP
    /// client, or configuration; it must not be cached past this call if
    /// the plugin wants reloads to pick up fresh configuration.
    async fn on_load(&self, _services: &PluginServices) -> Result<(), String> {
        Ok(())
    }

    /// Handle one of the plugin's declared commands.
    async fn handle_command(&self, command: &CommandName, args: Value) -> CommandOutcome;

    /// Serialize in-memory state ahead of a hot reload.
    ///
    /// Must not perform I/O and must not depend on other plugins. The
    /// default implementation carries nothing forward.
    async fn export_state(&self) -> Result<Value, String> {
        Ok(Value::Null)
    }

    /// Restore state exported by the previous instance during a hot reload.
    ///
    /// Called before `on_load` runs on the new instance. The default
    /// implementation discards it.
    async fn import_state(&self, _state: Value) -> Result<(), String> {
        Ok(())
    }

    /// Called once before the plugin is dropped. Any failure is logged but
    /// never prevents removal.
    async fn on_unload(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Constructs a fresh [`Plugin`] instance for a given entry point.
pub type PluginFactory = Arc<dyn Fn() -> Arc<dyn Plugin> + Send + Sync>;

/// Maps manifest `entry_point` strings to the factories that construct them.
///
/// Populated by whatever binary embeds this crate (the kernel, or a test)
/// before discovery runs; the manager itself never constructs factories.
#[derive(Clone, Default)]
pub struct FactoryRegistry {
    factories: Arc<Mutex<HashMap<String, PluginFactory>>>,
}

impl FactoryRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `entry_point`, replacing any prior one.
    pub fn register(&self, entry_point: impl Into<String>, factory: PluginFactory) {
        self.factories
            .lock()
            .expect("factory registry mutex poisoned")
            .insert(entry_point.into(), factory);
    }

    /// Look up the factory registered for `entry_point`.
    #[must_use]
    pub fn get(&self, entry_point: &str) -> Option<PluginFactory> {
        self.factories
            .lock()
            .expect("factory registry mutex poisoned")
            .get(entry_point)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo(PluginName);

    #[async_trait]
    impl Plugin for Echo {
        fn name(&self) -> &PluginName {
            &self.0
        }

        async fn handle_command(&self, _command: &CommandName, args: Value) -> CommandOutcome {
            Ok(args)
        }
    }

    #[test]
    fn registry_round_trips_a_factory() {
        let registry = FactoryRegistry::new();
        registry.register(
            "echo",
            Arc::new(|| Arc::new(Echo(PluginName::new("echo").unwrap())) as Arc<dyn Plugin>),
        );
        let factory = registry.get("echo").expect("factory registered");
        let instance = factory();
        assert_eq!(instance.name().as_str(), "echo");
        assert!(registry.get("missing").is_none());
    }
}
