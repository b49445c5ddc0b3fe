//! Framing for the two MCP transports: line-delimited child-process streams
//! and HTTP(+SSE) bodies.

use crate::error::{ProtocolError, ProtocolErrorKind, ProtocolResult};
use crate::message::Message;

/// Default maximum length of a single line-framed message, in bytes.
pub const DEFAULT_MAX_LINE_BYTES: usize = 8 * 1024 * 1024;

/// Frames and parses JSON-RPC messages for the line-delimited child-process
/// transport: one UTF-8 JSON object per line.
#[derive(Debug, Clone)]
pub struct LineCodec {
    max_line_bytes: usize,
}

impl Default for LineCodec {
    fn default() -> Self {
        Self {
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

impl LineCodec {
    /// Build a codec with a custom maximum line length.
    #[must_use]
    pub fn with_max_line_bytes(max_line_bytes: usize) -> Self {
        Self { max_line_bytes }
    }

    /// Decode one already-read line (without its trailing newline) into a
    /// [`Message`].
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] if the line exceeds the configured maximum
    /// length, or if it is not a well-formed JSON-RPC message.
    pub fn decode_line(&self, line: &str) -> ProtocolResult<Message> {
        if line.len() > self.max_line_bytes {
            return Err(ProtocolError::new(
                ProtocolErrorKind::Oversize,
                format!(
                    "line of {} bytes exceeds maximum of {} bytes",
                    line.len(),
                    self.max_line_bytes
                ),
            ));
        }
        Message::parse(line)
    }

    /// Encode a message as a single line (no trailing newline; the caller's
    /// transport is responsible for appending it).
    #[must_use]
    pub fn encode(&self, message: &Message) -> String {
        message.to_line()
    }
}

/// Frames and parses JSON-RPC messages for the HTTP transport: a request
/// body is one JSON object; a streaming response is a sequence of
/// `data: <json>\n\n` server-sent-event frames.
#[derive(Debug, Clone, Default)]
pub struct HttpCodec;

impl HttpCodec {
    /// Encode a message as an HTTP request body.
    #[must_use]
    pub fn encode_body(&self, message: &Message) -> String {
        message.to_line()
    }

    /// Decode a plain JSON HTTP response body into a [`Message`].
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] if the body is not a well-formed JSON-RPC
    /// message.
    pub fn decode_body(&self, body: &str) -> ProtocolResult<Message> {
        Message::parse(body)
    }

    /// Decode a single SSE-style event frame (`data: ...` payload, sentinel
    /// already stripped by the transport) into a [`Message`].
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] if the payload is not a well-formed
    /// JSON-RPC message.
    pub fn decode_stream_event(&self, payload: &str) -> ProtocolResult<Message> {
        let payload = payload.strip_prefix("data: ").unwrap_or(payload).trim();
        Message::parse(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{NotificationMessage, RequestMessage};
    use serde_json::json;

    #[test]
    fn decode_line_round_trips() {
        let codec = LineCodec::default();
        let message = Message::Request(RequestMessage::new(json!(1), "tools/list", None));
        let line = codec.encode(&message);
        let decoded = codec.decode_line(&line).unwrap();
        assert!(matches!(decoded, Message::Request(_)));
    }

    #[test]
    fn decode_line_rejects_oversize() {
        let codec = LineCodec::with_max_line_bytes(16);
        let message = Message::Notification(NotificationMessage::new(
            "a_long_method_name_that_is_too_big",
            None,
        ));
        let line = codec.encode(&message);
        let err = codec.decode_line(&line).unwrap_err();
        assert_eq!(err.kind(), ProtocolErrorKind::Oversize);
    }

    #[test]
    fn http_codec_decodes_sse_event() {
        let codec = HttpCodec;
        let frame = r#"data: {"jsonrpc":"2.0","method":"notifications/toolsChanged"}"#;
        let message = codec.decode_stream_event(frame).unwrap();
        assert!(matches!(message, Message::Notification(_)));
    }
}
