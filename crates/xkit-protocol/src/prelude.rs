//! Convenience re-exports for downstream crates.

pub use crate::codec::{DEFAULT_MAX_LINE_BYTES, HttpCodec, LineCodec};
pub use crate::error::{ProtocolError, ProtocolErrorKind, ProtocolResult};
pub use crate::message::{
    ErrorObject, METHOD_NOT_FOUND, Message, NotificationMessage, RequestMessage, ResponseMessage,
    ResponseOutcome,
};
