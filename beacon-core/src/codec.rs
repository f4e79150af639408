//! Codec for events channel frames
//!
//! Thin layer over `serde_json` that maps failures onto the crate error type
//! and keeps the frame direction explicit: the client only ever encodes
//! [`ClientFrame`]s and decodes [`ServerFrame`]s.
//!
//! # Error Handling
//!
//! - Invalid JSON or a known frame type with malformed fields →
//!   `Error::Serialization`
//! - A well-formed frame of an unknown type is **not** an error: it decodes to
//!   [`ServerFrame::Unknown`] so the connection can ignore it
//!
//! # Examples
//!
//! ```rust
//! use beacon_core::{codec, ClientFrame, ServerFrame};
//!
//! let text = codec::encode(&ClientFrame::Ping).unwrap();
//! assert_eq!(text, r#"{"type":"ping"}"#);
//!
//! let frame = codec::decode(r#"{"type":"pong"}"#).unwrap();
//! assert_eq!(frame, ServerFrame::Pong {});
//! ```

use crate::error::{Error, Result};
use crate::types::{ClientFrame, ServerFrame};

/// Encode a client frame to a JSON text message
pub fn encode(frame: &ClientFrame) -> Result<String> {
    serde_json::to_string(frame).map_err(|e| Error::Serialization(e.to_string()))
}

/// Decode a JSON text message into a server frame
///
/// The payload must be a JSON object with a string `type` field; anything
/// else is rejected before variant matching so that arrays or bare values
/// produce a clear error instead of a confusing serde message.
pub fn decode(text: &str) -> Result<ServerFrame> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| Error::Serialization(e.to_string()))?;

    match value.get("type") {
        Some(serde_json::Value::String(_)) => {}
        Some(_) => {
            return Err(Error::Serialization(
                "frame `type` must be a string".to_string(),
            ))
        }
        None => return Err(Error::Serialization("frame has no `type`".to_string())),
    }

    serde_json::from_value(value).map_err(|e| Error::Serialization(e.to_string()))
}
