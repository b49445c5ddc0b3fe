//! The plugin manager: discovery, loading, hot reload, and command dispatch.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{info, warn};

use xkit_core::ids::{CommandName, PluginName};
use xkit_events::catalog;

use crate::discovery::{self, DiscoveredPlugin};
use crate::error::{PluginError, PluginResult};
use crate::manifest::PluginManifest;
use crate::plugin::{FactoryRegistry, Plugin, PluginServices};

struct LoadedPlugin {
    instance: Arc<dyn Plugin>,
}

/// Owns every loaded plugin, the commands they have claimed, and the
/// factory registry used to construct new instances.
///
/// Cheap to clone: state lives behind `Arc`s, matching the other long-lived
/// service handles in this runtime.
#[derive(Clone)]
pub struct PluginManager {
    factories: FactoryRegistry,
    services: PluginServices,
    plugins: Arc<RwLock<HashMap<PluginName, LoadedPlugin>>>,
    command_owners: Arc<RwLock<HashMap<CommandName, PluginName>>>,
}

impl PluginManager {
    /// Create a manager around a factory registry and the narrow port view
    /// every loaded plugin is handed.
    #[must_use]
    pub fn new(factories: FactoryRegistry, services: PluginServices) -> Self {
        Self {
            factories,
            services,
            plugins: Arc::new(RwLock::new(HashMap::new())),
            command_owners: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Scan `roots` for manifests without loading anything.
    ///
    /// # Errors
    ///
    /// Returns an error if a manifest on disk cannot be parsed.
    pub fn discover(&self, roots: &[PathBuf]) -> PluginResult<Vec<DiscoveredPlugin>> {
        discovery::discover(roots)
    }

    /// Discover `roots` and load every plugin found, in discovery order.
    ///
    /// A plugin whose `requires` are not yet loaded is skipped with a
    /// warning rather than aborting the whole batch, since discovery order
    /// is not guaranteed to respect dependency order.
    ///
    /// # Errors
    ///
    /// Returns an error if a manifest cannot be parsed.
    pub async fn discover_and_load_all(&self, roots: &[PathBuf]) -> PluginResult<Vec<PluginName>> {
        let found = self.discover(roots)?;
        let mut loaded = Vec::new();
        for discovered in found {
            let name = discovered.manifest.name.clone();
            match self.load(discovered.manifest).await {
                Ok(()) => loaded.push(name),
                Err(err) => warn!(plugin = %name, %err, "skipped plugin during discovery load"),
            }
        }
        Ok(loaded)
    }

    /// Construct and initialize a single plugin from its manifest.
    ///
    /// Command-conflict detection runs before the plugin is constructed, so
    /// a rejected load registers nothing.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::AlreadyLoaded`] if the name is already loaded,
    /// [`PluginError::UnknownEntryPoint`] if no factory is registered for
    /// `manifest.entry_point`, [`PluginError::MissingDependency`] if a
    /// `requires` entry is not loaded, [`PluginError::CommandConflict`] if a
    /// declared command is already owned by another plugin, or
    /// [`PluginError::LifecycleFailed`] if `on_load` errors or panics.
    pub async fn load(&self, manifest: PluginManifest) -> PluginResult<()> {
        let name = manifest.name.clone();

        if self.plugins.read().await.contains_key(&name) {
            return Err(PluginError::AlreadyLoaded(name));
        }

        let loaded = self.plugins.read().await;
        for dependency in &manifest.requires {
            if !loaded.contains_key(dependency) {
                return Err(PluginError::MissingDependency {
                    plugin: name.clone(),
                    dependency: dependency.clone(),
                });
            }
        }
        drop(loaded);

        {
            let owners = self.command_owners.read().await;
            for command in &manifest.declared_commands {
                if let Some(existing) = owners.get(command) {
                    if *existing != name {
                        return Err(PluginError::CommandConflict {
                            command: command.clone(),
                            existing: existing.clone(),
                        });
                    }
                }
            }
        }

        let factory = self
            .factories
            .get(&manifest.entry_point)
            .ok_or_else(|| PluginError::UnknownEntryPoint(manifest.entry_point.clone()))?;
        let instance = factory();

        self.run_lifecycle_hook(&name, "on_load", instance.on_load(&self.services))
            .await?;

        let mut owners = self.command_owners.write().await;
        for command in &manifest.declared_commands {
            owners.insert(command.clone(), name.clone());
        }
        drop(owners);

        self.plugins
            .write()
            .await
            .insert(name.clone(), LoadedPlugin { instance });

        info!(plugin = %name, "plugin loaded");
        self.publish(catalog::PLUGIN_LOADED, &name).await;
        Ok(())
    }

    /// Shut down and remove a loaded plugin, releasing the commands it
    /// owned and unsubscribing anything it registered under its own name
    /// on the event bus.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::NotLoaded`] if no such plugin is loaded, or
    /// [`PluginError::LifecycleFailed`] if `on_unload` errors or panics (the
    /// plugin is still removed either way).
    pub async fn unload(&self, name: &PluginName) -> PluginResult<()> {
        let removed = self.plugins.write().await.remove(name);
        let Some(loaded) = removed else {
            return Err(PluginError::NotLoaded(name.clone()));
        };

        let mut owners = self.command_owners.write().await;
        owners.retain(|_, owner| owner != name);
        drop(owners);

        self.services.event_bus.unsubscribe_owner(name.as_str()).await;

        let result = self
            .run_lifecycle_hook(name, "on_unload", loaded.instance.on_unload())
            .await;

        info!(plugin = %name, "plugin unloaded");
        self.publish(catalog::PLUGIN_UNLOADED, name).await;
        result
    }

    /// Hot-reload a plugin: export its state, construct and initialize the
    /// replacement instance off to the side, and only once that succeeds
    /// swap it in for the old instance (which is then unloaded) and import
    /// the exported state into it.
    ///
    /// If the replacement fails at any step — unknown entry point, a
    /// declared command now conflicting with another plugin, a missing
    /// dependency, or a failing `on_load` — the old instance is never
    /// touched: it remains loaded under `name`, still owning its commands,
    /// and the exported state is discarded. The replacement's name must
    /// match the one being replaced; use [`PluginManager::load`] directly to
    /// load a plugin under a new name.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::NotLoaded`] if `name` is not currently
    /// loaded, or propagates errors from `export_state`, dependency/command
    /// validation, the factory lookup, `on_load`, or `import_state`.
    pub async fn reload(&self, name: &PluginName, new_manifest: PluginManifest) -> PluginResult<()> {
        if new_manifest.name != *name {
            return Err(PluginError::LifecycleFailed {
                plugin: name.clone(),
                phase: "reload",
                message: format!(
                    "replacement manifest name {} does not match {name}",
                    new_manifest.name
                ),
            });
        }

        let state = {
            let plugins = self.plugins.read().await;
            let loaded = plugins.get(name).ok_or_else(|| PluginError::NotLoaded(name.clone()))?;
            self.run_lifecycle_hook(name, "export_state", loaded.instance.export_state())
                .await?
        };

        {
            let plugins = self.plugins.read().await;
            for dependency in &new_manifest.requires {
                if !plugins.contains_key(dependency) {
                    return Err(PluginError::MissingDependency {
                        plugin: name.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }
        }

        {
            let owners = self.command_owners.read().await;
            for command in &new_manifest.declared_commands {
                if let Some(existing) = owners.get(command) {
                    if existing != name {
                        return Err(PluginError::CommandConflict {
                            command: command.clone(),
                            existing: existing.clone(),
                        });
                    }
                }
            }
        }

        let factory = self
            .factories
            .get(&new_manifest.entry_point)
            .ok_or_else(|| PluginError::UnknownEntryPoint(new_manifest.entry_point.clone()))?;
        let replacement = factory();

        // Subscriptions are keyed by subscriber id (the plugin name), not by
        // instance, so the old instance's subscriptions must be captured
        // before `on_load` runs: the replacement may subscribe under the
        // same name, and a blanket unsubscribe-by-name afterward would tear
        // those fresh subscriptions out along with the stale ones.
        let stale_subscriptions = self.services.event_bus.subscriptions_owned_by(name.as_str()).await;

        // The old instance is still loaded and serving commands here; if
        // `on_load` fails, we return without ever having touched it.
        self.run_lifecycle_hook(name, "on_load", replacement.on_load(&self.services))
            .await?;

        let old_instance = {
            let mut plugins = self.plugins.write().await;
            let mut owners = self.command_owners.write().await;

            let old = plugins
                .remove(name)
                .expect("presence re-checked under the same lock that exported state");
            owners.retain(|_, owner| owner != name);
            for command in &new_manifest.declared_commands {
                owners.insert(command.clone(), name.clone());
            }
            plugins.insert(name.clone(), LoadedPlugin {
                instance: replacement.clone(),
            });
            old.instance
        };

        for subscription_id in stale_subscriptions {
            self.services.event_bus.unsubscribe(subscription_id).await;
        }
        let _ = self.run_lifecycle_hook(name, "on_unload", old_instance.on_unload()).await;

        self.run_lifecycle_hook(name, "import_state", replacement.import_state(state))
            .await?;

        info!(plugin = %name, "plugin reloaded");
        self.publish(catalog::PLUGIN_RELOADED, name).await;
        Ok(())
    }

    /// Dispatch a command to whichever plugin declared it.
    ///
    /// A panic inside the plugin's handler is caught and turned into an
    /// error rather than taking down the dispatching task.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::UnknownCommand`] if no plugin declares this
    /// command, [`PluginError::NotLoaded`] if its owner has since been
    /// unloaded, or [`PluginError::LifecycleFailed`] if the handler errors
    /// or panics.
    pub async fn dispatch_command(&self, command: &CommandName, args: Value) -> PluginResult<Value> {
        let owner = self
            .command_owners
            .read()
            .await
            .get(command)
            .cloned()
            .ok_or_else(|| PluginError::UnknownCommand(command.clone()))?;

        let plugins = self.plugins.read().await;
        let loaded = plugins
            .get(&owner)
            .ok_or_else(|| PluginError::NotLoaded(owner.clone()))?;
        let instance = loaded.instance.clone();
        drop(plugins);

        let outcome = AssertUnwindSafe(instance.handle_command(command, args))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(message)) => Err(PluginError::LifecycleFailed {
                plugin: owner,
                phase: "handle_command",
                message,
            }),
            Err(panic) => Err(PluginError::LifecycleFailed {
                plugin: owner,
                phase: "handle_command",
                message: describe_panic(&panic),
            }),
        }
    }

    /// Names of the currently loaded plugins.
    pub async fn loaded(&self) -> Vec<PluginName> {
        self.plugins.read().await.keys().cloned().collect()
    }

    /// Every command currently bound to a loaded plugin.
    pub async fn known_commands(&self) -> Vec<CommandName> {
        self.command_owners.read().await.keys().cloned().collect()
    }

    /// The plugin that owns `command`, if any.
    pub async fn command_owner(&self, command: &CommandName) -> Option<PluginName> {
        self.command_owners.read().await.get(command).cloned()
    }

    async fn run_lifecycle_hook<F>(&self, plugin: &PluginName, phase: &'static str, future: F) -> PluginResult<()>
    where
        F: std::future::Future<Output = Result<(), String>>,
    {
        let outcome = AssertUnwindSafe(future).catch_unwind().await;
        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(message)) => Err(PluginError::LifecycleFailed {
                plugin: plugin.clone(),
                phase,
                message,
            }),
            Err(panic) => Err(PluginError::LifecycleFailed {
                plugin: plugin.clone(),
                phase,
                message: describe_panic(&panic),
            }),
        }
    }

    async fn publish(&self, event_type: &str, plugin: &PluginName) {
        let Ok(event_type) = xkit_core::ids::EventTypeName::new(event_type) else {
            return;
        };
        let payload = serde_json::json!({ "plugin": plugin.as_str() });
        let _ = self.services.event_bus.publish(event_type, payload, None).await;
    }
}

fn describe_panic(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "plugin panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use xkit_core::config::{EventBusConfig, RuntimeConfig};
    use xkit_core::ids::EventTypeName;
    use xkit_events::bus::EventBus;

    fn plugin_name(s: &str) -> PluginName {
        PluginName::new(s).unwrap()
    }

    fn command_name(s: &str) -> CommandName {
        CommandName::new(s).unwrap()
    }

    fn manifest(name: &str, entry_point: &str, commands: &[&str], requires: &[&str]) -> PluginManifest {
        PluginManifest {
            name: plugin_name(name),
            version: "0.1.0".to_string(),
            entry_point: entry_point.to_string(),
            declared_commands: commands.iter().map(|c| command_name(c)).collect(),
            declared_events: Vec::new(),
            requires: requires.iter().map(|r| plugin_name(r)).collect(),
        }
    }

    fn services_with(bus: EventBus) -> PluginServices {
        PluginServices {
            event_bus: bus,
            mcp_client: None,
            config: Arc::new(RuntimeConfig::default()),
        }
    }

    fn fresh_services() -> PluginServices {
        services_with(EventBus::new(EventBusConfig::default()))
    }

    struct Echo {
        name: PluginName,
    }

    #[async_trait]
    impl Plugin for Echo {
        fn name(&self) -> &PluginName {
            &self.name
        }

        async fn handle_command(&self, _command: &CommandName, args: Value) -> Result<Value, String> {
            Ok(args)
        }
    }

    struct Counter {
        name: PluginName,
        value: std::sync::atomic::AtomicI64,
    }

    #[async_trait]
    impl Plugin for Counter {
        fn name(&self) -> &PluginName {
            &self.name
        }

        async fn handle_command(&self, command: &CommandName, _args: Value) -> Result<Value, String> {
            if command.as_str() == "increment" {
                let next = self.value.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
                Ok(serde_json::json!({ "value": next }))
            } else {
                Ok(serde_json::json!({ "value": self.value.load(std::sync::atomic::Ordering::SeqCst) }))
            }
        }

        async fn export_state(&self) -> Result<Value, String> {
            Ok(serde_json::json!({ "value": self.value.load(std::sync::atomic::Ordering::SeqCst) }))
        }

        async fn import_state(&self, state: Value) -> Result<(), String> {
            if let Some(value) = state.get("value").and_then(Value::as_i64) {
                self.value.store(value, std::sync::atomic::Ordering::SeqCst);
            }
            Ok(())
        }
    }

    struct Panicky {
        name: PluginName,
    }

    #[async_trait]
    impl Plugin for Panicky {
        fn name(&self) -> &PluginName {
            &self.name
        }

        async fn handle_command(&self, _command: &CommandName, _args: Value) -> Result<Value, String> {
            panic!("kaboom");
        }
    }

    fn registry_with(name: &str, factory: impl Fn() -> Arc<dyn Plugin> + Send + Sync + 'static) -> FactoryRegistry {
        let registry = FactoryRegistry::new();
        registry.register(name, Arc::new(factory));
        registry
    }

    #[tokio::test]
    async fn load_registers_declared_commands() {
        let registry = registry_with("echo", || {
            Arc::new(Echo {
                name: plugin_name("echo"),
            }) as Arc<dyn Plugin>
        });
        let manager = PluginManager::new(registry, fresh_services());
        manager
            .load(manifest("echo", "echo", &["say"], &[]))
            .await
            .unwrap();

        let result = manager
            .dispatch_command(&command_name("say"), serde_json::json!({"text": "hi"}))
            .await
            .unwrap();
        assert_eq!(result, serde_json::json!({"text": "hi"}));
    }

    #[tokio::test]
    async fn command_conflict_is_rejected() {
        let registry = registry_with("echo", || {
            Arc::new(Echo {
                name: plugin_name("echo"),
            }) as Arc<dyn Plugin>
        });
        let manager = PluginManager::new(registry, fresh_services());
        manager
            .load(manifest("first", "echo", &["say"], &[]))
            .await
            .unwrap();

        let err = manager
            .load(manifest("second", "echo", &["say"], &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::CommandConflict { .. }));
    }

    #[tokio::test]
    async fn missing_dependency_is_rejected() {
        let registry = registry_with("echo", || {
            Arc::new(Echo {
                name: plugin_name("echo"),
            }) as Arc<dyn Plugin>
        });
        let manager = PluginManager::new(registry, fresh_services());
        let err = manager
            .load(manifest("dependent", "echo", &[], &["missing"]))
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::MissingDependency { .. }));
    }

    #[tokio::test]
    async fn reload_carries_state_across_instances() {
        let registry = registry_with("counter", || {
            Arc::new(Counter {
                name: plugin_name("counter"),
                value: std::sync::atomic::AtomicI64::new(0),
            }) as Arc<dyn Plugin>
        });
        let manager = PluginManager::new(registry, fresh_services());
        manager
            .load(manifest("counter", "counter", &["increment"], &[]))
            .await
            .unwrap();

        for _ in 0..3 {
            manager
                .dispatch_command(&command_name("increment"), Value::Null)
                .await
                .unwrap();
        }

        manager
            .reload(&plugin_name("counter"), manifest("counter", "counter", &["increment"], &[]))
            .await
            .unwrap();

        let result = manager
            .dispatch_command(&command_name("increment"), Value::Null)
            .await
            .unwrap();
        assert_eq!(result, serde_json::json!({"value": 4}));
    }

    #[tokio::test]
    async fn failing_plugin_does_not_affect_others() {
        let registry = FactoryRegistry::new();
        registry.register(
            "panicky",
            Arc::new(|| {
                Arc::new(Panicky {
                    name: plugin_name("panicky"),
                }) as Arc<dyn Plugin>
            }),
        );
        registry.register(
            "echo",
            Arc::new(|| {
                Arc::new(Echo {
                    name: plugin_name("echo"),
                }) as Arc<dyn Plugin>
            }),
        );
        let manager = PluginManager::new(registry, fresh_services());
        manager
            .load(manifest("panicky", "panicky", &["explode"], &[]))
            .await
            .unwrap();
        manager
            .load(manifest("echo", "echo", &["say"], &[]))
            .await
            .unwrap();

        let err = manager
            .dispatch_command(&command_name("explode"), Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::LifecycleFailed { .. }));

        let result = manager
            .dispatch_command(&command_name("say"), serde_json::json!("still alive"))
            .await
            .unwrap();
        assert_eq!(result, serde_json::json!("still alive"));
    }

    #[tokio::test]
    async fn unload_releases_owned_commands() {
        let registry = registry_with("echo", || {
            Arc::new(Echo {
                name: plugin_name("echo"),
            }) as Arc<dyn Plugin>
        });
        let manager = PluginManager::new(registry.clone(), fresh_services());
        manager
            .load(manifest("echo", "echo", &["say"], &[]))
            .await
            .unwrap();
        manager.unload(&plugin_name("echo")).await.unwrap();

        manager
            .load(manifest("echo2", "echo", &["say"], &[]))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn load_publishes_plugin_loaded_event() {
        let bus = EventBus::new(EventBusConfig::default());
        bus.declare_builtin_types().await;
        let count = Arc::new(AtomicU32::new(0));
        let counter = count.clone();
        bus.subscribe(
            EventTypeName::new(catalog::PLUGIN_LOADED).unwrap(),
            "test",
            Arc::new(move |_: &xkit_events::envelope::EventEnvelope| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
            xkit_events::subscription::DeliveryMode::BestEffort,
            None,
        )
        .await;

        let registry = registry_with("echo", || {
            Arc::new(Echo {
                name: plugin_name("echo"),
            }) as Arc<dyn Plugin>
        });
        let manager = PluginManager::new(registry, services_with(bus));
        manager
            .load(manifest("echo", "echo", &[], &[]))
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
