//! The command registry: built-in command bindings owned directly by the
//! kernel, as opposed to the ones plugins register through the plugin
//! manager.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use xkit_core::ids::CommandName;
use xkit_core::outcome::HandlerOutcome;

/// A command bound directly into the kernel rather than contributed by a
/// plugin (e.g. `help`, `plugins list`).
#[async_trait]
pub trait BuiltinCommand: Send + Sync {
    /// Run the command, producing the outcome the dispatcher returns.
    async fn handle(&self, args: Value) -> HandlerOutcome;
}

#[async_trait]
impl<F> BuiltinCommand for F
where
    F: Fn(Value) -> HandlerOutcome + Send + Sync,
{
    async fn handle(&self, args: Value) -> HandlerOutcome {
        self(args)
    }
}

/// Bindings for built-in commands, keyed by name.
#[derive(Clone, Default)]
pub struct CommandRegistry {
    bindings: Arc<RwLock<HashMap<CommandName, Arc<dyn BuiltinCommand>>>>,
}

impl CommandRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a handler to `name`, replacing any prior binding.
    pub async fn register(&self, name: CommandName, handler: Arc<dyn BuiltinCommand>) {
        self.bindings.write().await.insert(name, handler);
    }

    /// Remove a binding.
    pub async fn unregister(&self, name: &CommandName) {
        self.bindings.write().await.remove(name);
    }

    /// Look up the handler bound to `name`.
    pub async fn get(&self, name: &CommandName) -> Option<Arc<dyn BuiltinCommand>> {
        self.bindings.read().await.get(name).cloned()
    }

    /// All currently bound names.
    pub async fn names(&self) -> Vec<CommandName> {
        self.bindings.read().await.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> CommandName {
        CommandName::new(s).unwrap()
    }

    #[tokio::test]
    async fn register_then_get_round_trips() {
        let registry = CommandRegistry::new();
        registry
            .register(
                name("ping"),
                Arc::new(|_args: Value| HandlerOutcome::Ok(serde_json::json!("pong"))),
            )
            .await;

        let handler = registry.get(&name("ping")).await.expect("bound");
        let outcome = handler.handle(Value::Null).await;
        assert!(matches!(outcome, HandlerOutcome::Ok(_)));
        assert!(registry.get(&name("missing")).await.is_none());
    }

    #[tokio::test]
    async fn unregister_removes_the_binding() {
        let registry = CommandRegistry::new();
        registry
            .register(name("ping"), Arc::new(|_args: Value| HandlerOutcome::Ok(Value::Null)))
            .await;
        registry.unregister(&name("ping")).await;
        assert!(registry.get(&name("ping")).await.is_none());
    }
}
