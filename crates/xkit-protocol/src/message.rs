//! JSON-RPC 2.0 message shapes used by the MCP wire protocol.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ProtocolError, ProtocolErrorKind};

const JSONRPC_VERSION: &str = "2.0";

/// A JSON-RPC request: carries an id and expects a matching response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestMessage {
    jsonrpc: JsonRpcVersion,
    /// The request id, echoed back by the matching response.
    pub id: Value,
    /// The method name.
    pub method: String,
    /// Method parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// A JSON-RPC notification: no id, no response expected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationMessage {
    jsonrpc: JsonRpcVersion,
    /// The method name.
    pub method: String,
    /// Method parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// A JSON-RPC error object, required to carry `code` and `message`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorObject {
    /// Numeric error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Optional structured error data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// JSON-RPC error code for an unrecognized method, per the MCP wire contract.
pub const METHOD_NOT_FOUND: i64 = -32601;

/// A JSON-RPC response: either a `result` or an `error`, echoing a request
/// id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMessage {
    jsonrpc: JsonRpcVersion,
    /// The id of the request this responds to.
    pub id: Value,
    /// The outcome: success carries a result, failure carries an error.
    #[serde(flatten)]
    pub outcome: ResponseOutcome,
}

/// The success/failure payload of a [`ResponseMessage`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseOutcome {
    /// The call succeeded.
    Result {
        /// The result payload.
        result: Value,
    },
    /// The call failed.
    Error {
        /// The error object.
        error: ErrorObject,
    },
}

/// Marker type serialized/deserialized as the literal string `"2.0"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct JsonRpcVersion;

impl<'de> Deserialize<'de> for JsonRpcVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        if s != JSONRPC_VERSION {
            return Err(serde::de::Error::custom(format!(
                "unsupported jsonrpc version {s:?}"
            )));
        }
        Ok(Self)
    }
}

impl serde::Serialize for JsonRpcVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(JSONRPC_VERSION)
    }
}

impl RequestMessage {
    /// Build a new request.
    #[must_use]
    pub fn new(id: Value, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            id,
            method: method.into(),
            params,
        }
    }
}

impl NotificationMessage {
    /// Build a new notification.
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            method: method.into(),
            params,
        }
    }
}

impl ResponseMessage {
    /// Build a successful response.
    #[must_use]
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            id,
            outcome: ResponseOutcome::Result { result },
        }
    }

    /// Build an error response.
    #[must_use]
    pub fn error(id: Value, error: ErrorObject) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            id,
            outcome: ResponseOutcome::Error { error },
        }
    }
}

/// Any one of the three JSON-RPC message shapes the codec hands callers.
#[derive(Debug, Clone)]
pub enum Message {
    /// A request, expecting a response.
    Request(RequestMessage),
    /// A response to a previously sent request.
    Response(ResponseMessage),
    /// A one-way notification.
    Notification(NotificationMessage),
}

impl Message {
    /// Parse a single JSON-RPC message from its textual representation,
    /// classifying it as request/response/notification by the presence of
    /// `id`/`method`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] if the text is not valid JSON, is not a JSON
    /// object, or matches none of the three recognized shapes.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| ProtocolError::new(ProtocolErrorKind::MalformedJson, e.to_string()))?;
        let Value::Object(object) = &value else {
            return Err(ProtocolError::new(
                ProtocolErrorKind::MalformedJson,
                "message must be a JSON object".to_string(),
            ));
        };

        let has_id = object.contains_key("id");
        let has_method = object.contains_key("method");

        if has_method {
            if has_id {
                let request: RequestMessage = serde_json::from_value(value).map_err(|e| {
                    ProtocolError::new(ProtocolErrorKind::MalformedRequest, e.to_string())
                })?;
                Ok(Self::Request(request))
            } else {
                let notification: NotificationMessage =
                    serde_json::from_value(value).map_err(|e| {
                        ProtocolError::new(ProtocolErrorKind::MalformedRequest, e.to_string())
                    })?;
                Ok(Self::Notification(notification))
            }
        } else if has_id {
            let response: ResponseMessage = serde_json::from_value(value).map_err(|e| {
                ProtocolError::new(ProtocolErrorKind::MalformedResponse, e.to_string())
            })?;
            Ok(Self::Response(response))
        } else {
            Err(ProtocolError::new(
                ProtocolErrorKind::MalformedJson,
                "message has neither `id` nor `method`".to_string(),
            ))
        }
    }

    /// Serialize this message to a single line of JSON (no trailing
    /// newline).
    ///
    /// # Panics
    ///
    /// Never panics: all message variants are composed of types that always
    /// serialize successfully.
    #[must_use]
    pub fn to_line(&self) -> String {
        match self {
            Self::Request(r) => serde_json::to_string(r).expect("request always serializes"),
            Self::Response(r) => serde_json::to_string(r).expect("response always serializes"),
            Self::Notification(n) => {
                serde_json::to_string(n).expect("notification always serializes")
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_request() {
        let line = r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"a":1}}"#;
        match Message::parse(line).unwrap() {
            Message::Request(r) => {
                assert_eq!(r.method, "tools/call");
                assert_eq!(r.id, json!(1));
            },
            other => panic!("expected request, got {other:?}"),
        }
    }

    #[test]
    fn parses_notification() {
        let line = r#"{"jsonrpc":"2.0","method":"initialized"}"#;
        match Message::parse(line).unwrap() {
            Message::Notification(n) => assert_eq!(n.method, "initialized"),
            other => panic!("expected notification, got {other:?}"),
        }
    }

    #[test]
    fn parses_success_response() {
        let line = r#"{"jsonrpc":"2.0","id":1,"result":{"ok":true}}"#;
        match Message::parse(line).unwrap() {
            Message::Response(r) => match r.outcome {
                ResponseOutcome::Result { result } => assert_eq!(result, json!({"ok": true})),
                ResponseOutcome::Error { .. } => panic!("expected result"),
            },
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn parses_error_response() {
        let line = r#"{"jsonrpc":"2.0","id":2,"error":{"code":-32601,"message":"nope"}}"#;
        match Message::parse(line).unwrap() {
            Message::Response(r) => match r.outcome {
                ResponseOutcome::Error { error } => {
                    assert_eq!(error.code, METHOD_NOT_FOUND);
                    assert_eq!(error.message, "nope");
                },
                ResponseOutcome::Result { .. } => panic!("expected error"),
            },
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn rejects_malformed_json() {
        let err = Message::parse("not json").unwrap_err();
        assert_eq!(err.kind(), ProtocolErrorKind::MalformedJson);
    }

    #[test]
    fn rejects_message_without_id_or_method() {
        let err = Message::parse(r#"{"jsonrpc":"2.0"}"#).unwrap_err();
        assert_eq!(err.kind(), ProtocolErrorKind::MalformedJson);
    }

    #[test]
    fn round_trips_request_to_line() {
        let request = RequestMessage::new(json!(7), "tools/list", None);
        let line = Message::Request(request).to_line();
        match Message::parse(&line).unwrap() {
            Message::Request(r) => assert_eq!(r.id, json!(7)),
            other => panic!("expected request, got {other:?}"),
        }
    }
}
