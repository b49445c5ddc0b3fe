//! The hexagonal core: owns the ports, the MCP client, the plugin manager,
//! and the command registry, and exposes the single `dispatch` entry point
//! the CLI collaborator drives.

use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use xkit_core::config::{ConnectMode, RuntimeConfig};
use xkit_core::ids::{CommandName, CorrelationId, EventTypeName, ServerName};
use xkit_core::outcome::{DispatchResult, HandlerOutcome};
use xkit_events::bus::EventBus;
use xkit_events::catalog;
use xkit_mcp::client::McpClient;
use xkit_plugins::manager::PluginManager;
use xkit_plugins::plugin::{FactoryRegistry, PluginServices};

use crate::error::BootstrapResult;
use crate::ports::KernelPorts;
use crate::registry::CommandRegistry;
use crate::suggest;

/// The runtime's hexagonal core.
///
/// Cheap to clone: every field is itself a cheap-to-clone handle (`Arc` or
/// an `Arc`-backed service), matching the other long-lived handles in this
/// runtime.
#[derive(Clone)]
pub struct Kernel {
    ports: KernelPorts,
    config: Arc<RuntimeConfig>,
    event_bus: EventBus,
    mcp_client: McpClient,
    plugins: PluginManager,
    commands: CommandRegistry,
}

impl Kernel {
    /// Boot a kernel bound to the default system adapters: declares the
    /// built-in event types, registers and (eagerly) connects configured
    /// MCP servers, and discovers and loads plugins from `config.plugin_roots`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::BootstrapError::Plugin`] if a plugin root
    /// cannot be scanned or a manifest found there is malformed.
    pub async fn bootstrap(config: RuntimeConfig, factories: FactoryRegistry) -> BootstrapResult<Self> {
        let ports = KernelPorts::system(&config);
        Self::bootstrap_with_ports(config, factories, ports).await
    }

    /// Boot a kernel with an explicit set of port adapters, bypassing the
    /// system defaults — used by tests and by embedders that want their
    /// own `ProcessPort`/`HttpPort`/`ClockPort`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::BootstrapError::Plugin`] if a plugin root
    /// cannot be scanned or a manifest found there is malformed.
    pub async fn bootstrap_with_ports(
        config: RuntimeConfig,
        factories: FactoryRegistry,
        ports: KernelPorts,
    ) -> BootstrapResult<Self> {
        let config = Arc::new(config);

        let event_bus = EventBus::new(config.event_bus.clone());
        event_bus.declare_builtin_types().await;

        let mcp_client = McpClient::new(
            config.mcp_client.clone(),
            ports.process.clone(),
            ports.http.clone(),
            ports.clock.clone(),
            Some(event_bus.clone()),
        );
        register_configured_servers(&mcp_client, &config).await;

        let plugins = PluginManager::new(
            factories,
            PluginServices {
                event_bus: event_bus.clone(),
                mcp_client: Some(mcp_client.clone()),
                config: config.clone(),
            },
        );
        plugins.discover_and_load_all(&config.plugin_roots).await?;

        Ok(Self {
            ports,
            config,
            event_bus,
            mcp_client,
            plugins,
            commands: CommandRegistry::new(),
        })
    }

    /// The command registry for built-in (non-plugin) bindings.
    #[must_use]
    pub fn commands(&self) -> &CommandRegistry {
        &self.commands
    }

    /// The event bus, for collaborators (the CLI, tests) that want to
    /// subscribe directly.
    #[must_use]
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// The MCP client, for collaborators that want to call tools directly
    /// rather than through a dispatched command.
    #[must_use]
    pub fn mcp_client(&self) -> &McpClient {
        &self.mcp_client
    }

    /// The plugin manager, for collaborators that want to load/unload/reload
    /// plugins outside of a dispatched command.
    #[must_use]
    pub fn plugins(&self) -> &PluginManager {
        &self.plugins
    }

    /// The bound port adapters.
    #[must_use]
    pub fn ports(&self) -> &KernelPorts {
        &self.ports
    }

    /// The configuration this kernel was bootstrapped with.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Dispatch a command to its built-in or plugin-provided binding.
    ///
    /// Looks up `command` first among built-in bindings, then among
    /// plugin-declared commands. If a binding is found, publishes
    /// `CommandInvoked` before running it and `CommandCompleted` after,
    /// both carrying a fresh correlation id. If no binding exists, returns
    /// [`DispatchResult::UnknownCommand`] with the three closest known
    /// names by edit distance and publishes nothing.
    pub async fn dispatch(&self, command: CommandName, args: Value) -> DispatchResult {
        let builtin = self.commands.get(&command).await;
        let has_plugin_binding = builtin.is_none() && self.plugins.command_owner(&command).await.is_some();

        if builtin.is_none() && !has_plugin_binding {
            let mut known = self.commands.names().await;
            known.extend(self.plugins.known_commands().await);
            return DispatchResult::UnknownCommand {
                requested: command.as_str().to_string(),
                suggestions: suggest::closest(command.as_str(), &known, 3),
            };
        }

        let correlation_id = CorrelationId::new();
        self.publish_command_invoked(&command, correlation_id).await;
        let start = self.ports.clock.now();

        let outcome = if let Some(handler) = builtin {
            handler.handle(args).await
        } else {
            match self.plugins.dispatch_command(&command, args).await {
                Ok(value) => HandlerOutcome::Ok(value),
                Err(err) => HandlerOutcome::system_error("plugin command failed", err.to_string()),
            }
        };

        let duration_ms = (self.ports.clock.now() - start).num_milliseconds();
        self.publish_command_completed(&command, correlation_id, &outcome, duration_ms)
            .await;

        DispatchResult::Handled(outcome)
    }

    /// Reverse-order teardown: unload every loaded plugin, then disconnect
    /// every registered MCP server. Failures are logged but never stop the
    /// remaining teardown steps.
    pub async fn shutdown(&self) {
        for name in self.plugins.loaded().await {
            if let Err(err) = self.plugins.unload(&name).await {
                warn!(plugin = %name, %err, "failed to unload plugin during shutdown");
            }
        }
        for name in self.mcp_client.registered_servers().await {
            if let Err(err) = self.mcp_client.disconnect(&name).await {
                warn!(server = %name, %err, "failed to disconnect server during shutdown");
            }
        }
    }

    async fn publish_command_invoked(&self, command: &CommandName, correlation_id: CorrelationId) {
        let Ok(event_type) = EventTypeName::new(catalog::COMMAND_INVOKED) else {
            return;
        };
        let payload = serde_json::json!({ "command": command.as_str() });
        let _ = self.event_bus.publish(event_type, payload, Some(correlation_id)).await;
    }

    async fn publish_command_completed(
        &self,
        command: &CommandName,
        correlation_id: CorrelationId,
        outcome: &HandlerOutcome,
        duration_ms: i64,
    ) {
        let Ok(event_type) = EventTypeName::new(catalog::COMMAND_COMPLETED) else {
            return;
        };
        let payload = serde_json::json!({
            "command": command.as_str(),
            "exit_code": outcome.exit_code(),
            "duration_ms": duration_ms,
        });
        let _ = self.event_bus.publish(event_type, payload, Some(correlation_id)).await;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap as StdHashMap;
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    use async_trait::async_trait;
    use xkit_core::error::PortError;
    use xkit_core::ids::PluginName;
    use xkit_core::outcome::HandlerOutcome;
    use xkit_core::ports::{ChildProcess, HttpPort, HttpRequest, HttpResponse, LogLevel, LoggerPort, ProcessPort, ProcessSpec};
    use xkit_core::adapters::{StaticConfigPort, SystemClock};
    use xkit_events::subscription::{DeliveryMode, EventHandler};
    use xkit_plugins::plugin::{CommandOutcome, Plugin};

    use super::*;

    struct NoopProcessPort;
    #[async_trait]
    impl ProcessPort for NoopProcessPort {
        async fn spawn(&self, _spec: ProcessSpec) -> Result<Box<dyn ChildProcess>, PortError> {
            Err(PortError::ProcessExited)
        }
    }

    struct NoopHttpPort;
    #[async_trait]
    impl HttpPort for NoopHttpPort {
        async fn post_json(&self, _request: HttpRequest) -> Result<HttpResponse, PortError> {
            Err(PortError::ProcessExited)
        }

        async fn stream_events(
            &self,
            _url: &str,
            _headers: StdHashMap<String, String>,
        ) -> Result<tokio::sync::mpsc::Receiver<Value>, PortError> {
            let (_tx, rx) = tokio::sync::mpsc::channel(1);
            Ok(rx)
        }
    }

    struct NoopFilesystemPort;
    impl xkit_core::ports::FilesystemPort for NoopFilesystemPort {
        fn read_to_string(&self, _path: &Path) -> Result<String, PortError> {
            Err(PortError::ProcessExited)
        }
        fn read_dir(&self, _path: &Path) -> Result<Vec<PathBuf>, PortError> {
            Ok(Vec::new())
        }
        fn exists(&self, _path: &Path) -> bool {
            false
        }
    }

    struct NoopLogger;
    impl LoggerPort for NoopLogger {
        fn log(&self, _level: LogLevel, _target: &str, _message: &str, _fields: &[(&str, &str)]) {}
    }

    fn test_ports() -> KernelPorts {
        let config = RuntimeConfig::default();
        KernelPorts {
            config: Arc::new(StaticConfigPort::from_config(&config)),
            logger: Arc::new(NoopLogger),
            clock: Arc::new(SystemClock),
            process: Arc::new(NoopProcessPort),
            http: Arc::new(NoopHttpPort),
            filesystem: Arc::new(NoopFilesystemPort),
        }
    }

    struct Greeter {
        name: PluginName,
    }

    #[async_trait]
    impl Plugin for Greeter {
        fn name(&self) -> &PluginName {
            &self.name
        }

        async fn handle_command(&self, _command: &CommandName, args: Value) -> CommandOutcome {
            let who = args.get("who").and_then(Value::as_str).unwrap_or("world");
            Ok(serde_json::json!({ "greeting": format!("hello, {who}") }))
        }
    }

    async fn kernel_with_greeter_plugin() -> Kernel {
        let factories = FactoryRegistry::new();
        factories.register(
            "greeter",
            Arc::new(|| {
                Arc::new(Greeter {
                    name: PluginName::new("greeter").unwrap(),
                }) as Arc<dyn Plugin>
            }),
        );

        let kernel = Kernel::bootstrap_with_ports(RuntimeConfig::default(), factories, test_ports())
            .await
            .unwrap();

        kernel
            .plugins()
            .load(greeter_manifest())
            .await
            .unwrap();
        kernel
    }

    fn greeter_manifest() -> xkit_plugins::manifest::PluginManifest {
        xkit_plugins::manifest::PluginManifest {
            name: PluginName::new("greeter").unwrap(),
            version: "0.1.0".to_string(),
            entry_point: "greeter".to_string(),
            declared_commands: vec![CommandName::new("greet").unwrap()],
            declared_events: Vec::new(),
            requires: Vec::new(),
        }
    }

    #[tokio::test]
    async fn dispatches_to_a_builtin_command() {
        let kernel = Kernel::bootstrap_with_ports(RuntimeConfig::default(), FactoryRegistry::new(), test_ports())
            .await
            .unwrap();
        kernel
            .commands()
            .register(
                CommandName::new("ping").unwrap(),
                Arc::new(|_args: Value| HandlerOutcome::Ok(serde_json::json!("pong"))),
            )
            .await;

        let result = kernel.dispatch(CommandName::new("ping").unwrap(), Value::Null).await;
        match result {
            DispatchResult::Handled(HandlerOutcome::Ok(value)) => assert_eq!(value, serde_json::json!("pong")),
            other => panic!("expected a handled ok outcome, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn dispatches_to_a_plugin_owned_command() {
        let kernel = kernel_with_greeter_plugin().await;

        let result = kernel
            .dispatch(CommandName::new("greet").unwrap(), serde_json::json!({ "who": "kernel" }))
            .await;
        match result {
            DispatchResult::Handled(HandlerOutcome::Ok(value)) => {
                assert_eq!(value, serde_json::json!({ "greeting": "hello, kernel" }));
            },
            other => panic!("expected a handled ok outcome, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_command_returns_suggestions_without_publishing_events() {
        let kernel = Kernel::bootstrap_with_ports(RuntimeConfig::default(), FactoryRegistry::new(), test_ports())
            .await
            .unwrap();
        kernel
            .commands()
            .register(CommandName::new("status").unwrap(), Arc::new(|_| HandlerOutcome::Ok(Value::Null)))
            .await;

        let invoked = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = invoked.clone();
        let handler: Arc<dyn EventHandler> = Arc::new(move |_envelope: &xkit_events::envelope::EventEnvelope| {
            flag.store(true, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        });
        kernel
            .event_bus()
            .subscribe(
                xkit_core::ids::EventTypeName::new(catalog::COMMAND_INVOKED).unwrap(),
                "test",
                handler,
                DeliveryMode::BestEffort,
                None,
            )
            .await;

        let result = kernel.dispatch(CommandName::new("stat").unwrap(), Value::Null).await;
        match result {
            DispatchResult::UnknownCommand { requested, suggestions } => {
                assert_eq!(requested, "stat");
                assert_eq!(suggestions[0].as_str(), "status");
            },
            other => panic!("expected unknown command, got {other:?}"),
        }

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!invoked.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn shutdown_unloads_every_plugin() {
        let kernel = kernel_with_greeter_plugin().await;
        assert_eq!(kernel.plugins().loaded().await.len(), 1);

        kernel.shutdown().await;
        assert!(kernel.plugins().loaded().await.is_empty());
    }
}

async fn register_configured_servers(client: &McpClient, config: &RuntimeConfig) {
    for (raw_name, entry) in &config.servers {
        if !entry.enabled {
            continue;
        }
        let name = match ServerName::new(raw_name.clone()) {
            Ok(name) => name,
            Err(err) => {
                warn!(server = %raw_name, %err, "skipping server with invalid name");
                continue;
            },
        };
        if let Err(err) = client.register(name.clone(), entry.descriptor.clone()).await {
            warn!(server = %name, %err, "failed to register configured server");
            continue;
        }
        if entry.connect == ConnectMode::Eager {
            if let Err(err) = client.connect(&name).await {
                warn!(server = %name, %err, "eager connect failed at startup");
            }
        }
    }
}
