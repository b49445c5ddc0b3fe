//! Protocol-level errors: framing and JSON-RPC shape violations.

use thiserror::Error;

/// The kind of framing/validation failure encountered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolErrorKind {
    /// The line's bytes are not valid JSON, or not a JSON object.
    MalformedJson,
    /// The object looked like a request/notification but failed to match
    /// the required shape.
    MalformedRequest,
    /// The object looked like a response but failed to match the required
    /// shape (e.g. missing both `result` and `error`).
    MalformedResponse,
    /// A line exceeded the configured maximum length.
    Oversize,
    /// A response echoed an id that was never sent, or an id already
    /// resolved.
    UnknownResponseId,
}

/// A framing or JSON-RPC shape violation, carrying the byte offset (for
/// stream-based transports) at which it was detected.
#[derive(Debug, Clone, Error)]
#[error("protocol error ({kind:?}) at offset {offset:?}: {detail}")]
pub struct ProtocolError {
    kind: ProtocolErrorKind,
    offset: Option<u64>,
    detail: String,
}

impl ProtocolError {
    /// Construct a new protocol error with no associated offset.
    #[must_use]
    pub fn new(kind: ProtocolErrorKind, detail: String) -> Self {
        Self {
            kind,
            offset: None,
            detail,
        }
    }

    /// Attach a byte offset to this error.
    #[must_use]
    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// The kind of violation.
    #[must_use]
    pub fn kind(&self) -> ProtocolErrorKind {
        self.kind
    }

    /// The byte offset at which the violation was detected, if known.
    #[must_use]
    pub fn offset(&self) -> Option<u64> {
        self.offset
    }
}

/// Result alias for codec operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
