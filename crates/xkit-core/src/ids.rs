//! Validated identifier newtypes shared across the runtime.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Error returned when a raw string fails identifier validation.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid {kind} {value:?}: {reason}")]
pub struct InvalidIdentifier {
    kind: &'static str,
    value: String,
    reason: &'static str,
}

fn validate(kind: &'static str, value: &str) -> Result<(), InvalidIdentifier> {
    if value.is_empty() {
        return Err(InvalidIdentifier {
            kind,
            value: value.to_string(),
            reason: "must not be empty",
        });
    }
    if value.len() > 128 {
        return Err(InvalidIdentifier {
            kind,
            value: value.to_string(),
            reason: "must be at most 128 bytes",
        });
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':' | '/'))
    {
        return Err(InvalidIdentifier {
            kind,
            value: value.to_string(),
            reason: "must contain only ASCII alphanumerics, '-', '_', '.', ':' or '/'",
        });
    }
    Ok(())
}

macro_rules! validated_id {
    ($name:ident, $kind:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Validate and construct a new identifier.
            ///
            /// # Errors
            ///
            /// Returns [`InvalidIdentifier`] if `value` is empty, too long, or
            /// contains characters outside the allowed set.
            pub fn new(value: impl Into<String>) -> Result<Self, InvalidIdentifier> {
                let value = value.into();
                validate($kind, &value)?;
                Ok(Self(value))
            }

            /// Borrow the underlying string.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = InvalidIdentifier;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = InvalidIdentifier;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }
    };
}

validated_id!(ServerName, "server name");
validated_id!(PluginName, "plugin name");
validated_id!(CommandName, "command name");
validated_id!(ToolName, "tool name");
validated_id!(EventTypeName, "event type name");

/// Opaque identifier threading a single user-initiated activity through
/// commands, tool calls, and events for later reconstruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Generate a new random correlation id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID (used when correlating with an external caller).
    #[must_use]
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// The underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// A monotonically increasing sequence number assigned to published events.
pub type SequenceNumber = u64;

/// A monotonically increasing request id scoped to one MCP connection.
pub type RequestId = u64;

/// A globally unique subscription handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Generate a new subscription id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_name_accepts_sane_values() {
        assert!(ServerName::new("filesystem").is_ok());
        assert!(ServerName::new("github.internal").is_ok());
        assert!(ServerName::new("my_server-01").is_ok());
    }

    #[test]
    fn server_name_rejects_empty_and_bad_chars() {
        assert!(ServerName::new("").is_err());
        assert!(ServerName::new("has space").is_err());
        assert!(ServerName::new("emoji😀").is_err());
    }

    #[test]
    fn correlation_id_round_trips_through_display() {
        let id = CorrelationId::new();
        let text = id.to_string();
        assert_eq!(text.len(), 36);
    }
}
