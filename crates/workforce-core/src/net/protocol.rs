use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::messages::{CLIENT_MESSAGE_TYPES, ClientMessage, PUSH_MESSAGE_TYPES, PushMessage};

/// Maximum accepted text frame size in bytes.
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("empty message")]
    EmptyMessage,
    #[error("message has no type tag")]
    MissingType,
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),
    #[error("payload too large: {0} bytes (max {MAX_MESSAGE_SIZE})")]
    PayloadTooLarge(usize),
    #[error("serialize error: {0}")]
    SerializeError(String),
    #[error("deserialize error: {0}")]
    DeserializeError(String),
}

fn encode<T: Serialize>(msg: &T) -> Result<String, ProtocolError> {
    let text = serde_json::to_string(msg).map_err(|e| ProtocolError::SerializeError(e.to_string()))?;
    if text.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::PayloadTooLarge(text.len()));
    }
    Ok(text)
}

/// Encode a `PushMessage` as a JSON text frame.
pub fn encode_push_message(msg: &PushMessage) -> Result<String, ProtocolError> {
    encode(msg)
}

/// Encode a `ClientMessage` as a JSON text frame.
pub fn encode_client_message(msg: &ClientMessage) -> Result<String, ProtocolError> {
    encode(msg)
}

fn parse_envelope(text: &str) -> Result<(String, Value), ProtocolError> {
    if text.trim().is_empty() {
        return Err(ProtocolError::EmptyMessage);
    }
    if text.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::PayloadTooLarge(text.len()));
    }
    let value: Value =
        serde_json::from_str(text).map_err(|e| ProtocolError::DeserializeError(e.to_string()))?;
    let tag = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingType)?
        .to_string();
    Ok((tag, value))
}

/// Extract the `type` tag without decoding the body.
pub fn decode_message_type(text: &str) -> Result<String, ProtocolError> {
    parse_envelope(text).map(|(tag, _)| tag)
}

fn decode_known<T: DeserializeOwned>(text: &str, known: &[&str]) -> Result<T, ProtocolError> {
    let (tag, value) = parse_envelope(text)?;
    if !known.contains(&tag.as_str()) {
        return Err(ProtocolError::UnknownMessageType(tag));
    }
    serde_json::from_value(value).map_err(|e| ProtocolError::DeserializeError(e.to_string()))
}

/// Decode a server push frame. Unknown tags are reported as
/// `UnknownMessageType` so receivers can log and skip them.
pub fn decode_push_message(text: &str) -> Result<PushMessage, ProtocolError> {
    decode_known(text, PUSH_MESSAGE_TYPES)
}

/// Decode a client frame.
pub fn decode_client_message(text: &str) -> Result<ClientMessage, ProtocolError> {
    decode_known(text, CLIENT_MESSAGE_TYPES)
}
