//! The stable event type identifiers contributed by the core itself.
//!
//! Plugins may declare additional event types at load time; these are the
//! ones the kernel declares before anything else starts.

/// A command was looked up and about to run.
pub const COMMAND_INVOKED: &str = "CommandInvoked";
/// A command finished running (successfully or not).
pub const COMMAND_COMPLETED: &str = "CommandCompleted";
/// A plugin finished loading.
pub const PLUGIN_LOADED: &str = "PluginLoaded";
/// A plugin finished unloading.
pub const PLUGIN_UNLOADED: &str = "PluginUnloaded";
/// A plugin was hot-reloaded.
pub const PLUGIN_RELOADED: &str = "PluginReloaded";
/// A `required` subscriber failed to catch up and was detached.
pub const SUBSCRIBER_DETACHED: &str = "SubscriberDetached";
/// A handler invocation failed (returned an error or panicked).
pub const HANDLER_FAILED: &str = "HandlerFailed";
/// An MCP server connection became ready.
pub const SERVER_CONNECTED: &str = "ServerConnected";
/// An MCP server connection was lost or closed.
pub const SERVER_DISCONNECTED: &str = "ServerDisconnected";
/// A reconnect changed a server's tool set.
pub const TOOLS_CHANGED: &str = "ToolsChanged";

/// All built-in event type identifiers, in declaration order.
pub const ALL: &[&str] = &[
    COMMAND_INVOKED,
    COMMAND_COMPLETED,
    PLUGIN_LOADED,
    PLUGIN_UNLOADED,
    PLUGIN_RELOADED,
    SUBSCRIBER_DETACHED,
    HANDLER_FAILED,
    SERVER_CONNECTED,
    SERVER_DISCONNECTED,
    TOOLS_CHANGED,
];
