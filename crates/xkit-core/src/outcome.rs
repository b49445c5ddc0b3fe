//! Handler and dispatch outcome types shared by the kernel and plugins.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::CommandName;

/// The result a command handler (plugin-owned or built-in) returns.
///
/// Distinguishes bad user input (not logged as an incident) from genuine
/// system failures, per the dispatch error taxonomy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum HandlerOutcome {
    /// The command succeeded, producing a JSON payload.
    Ok(Value),
    /// The user supplied bad input; surfaced verbatim, never logged as an
    /// incident.
    UserError(String),
    /// An internal failure occurred; `cause` is an optional lower-level
    /// detail retained for diagnostics.
    SystemError {
        /// Human-readable summary.
        message: String,
        /// Optional underlying cause.
        cause: Option<String>,
    },
}

impl HandlerOutcome {
    /// Build a [`HandlerOutcome::SystemError`] from a message and cause.
    #[must_use]
    pub fn system_error(message: impl Into<String>, cause: impl Into<String>) -> Self {
        Self::SystemError {
            message: message.into(),
            cause: Some(cause.into()),
        }
    }

    /// Exit code the CLI collaborator maps this outcome to.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Ok(_) => 0,
            Self::UserError(_) => 2,
            Self::SystemError { .. } => 70,
        }
    }
}

/// What `Kernel::dispatch` returns to its caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DispatchResult {
    /// The command was found and ran to completion.
    Handled(HandlerOutcome),
    /// No binding exists for the requested command.
    UnknownCommand {
        /// The command that was requested.
        requested: String,
        /// Up to three closest known command names by edit distance.
        suggestions: Vec<CommandName>,
    },
}

impl DispatchResult {
    /// Exit code the CLI collaborator maps this result to.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Handled(outcome) => outcome.exit_code(),
            Self::UnknownCommand { .. } => 3,
        }
    }
}
