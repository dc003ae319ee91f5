//! Inbound payload classification
//!
//! One read is one request. A payload is either the `ping` literal, JSON
//! object/array text, or malformed.

use serde::de::IgnoredAny;

use crate::error::{BridgeError, BridgeResult};
use crate::types::PING_LITERAL;

#[derive(Debug, PartialEq, Eq)]
pub enum Inbound<'a> {
    Ping,
    Json(&'a str),
    Malformed(String),
}

/// Decode raw bytes from one read as UTF-8
pub fn decode_request(bytes: &[u8]) -> BridgeResult<&str> {
    std::str::from_utf8(bytes).map_err(|e| BridgeError::malformed(format!("payload is not valid UTF-8: {e}")))
}

/// Classify a decoded request
pub fn classify(text: &str) -> Inbound<'_> {
    let trimmed = text.trim();

    if trimmed.is_empty() {
        return Inbound::Malformed("empty command received".to_string());
    }
    if trimmed == PING_LITERAL {
        return Inbound::Ping;
    }
    if !is_json_text(trimmed) {
        return Inbound::Malformed("payload must be a JSON object or array".to_string());
    }
    Inbound::Json(trimmed)
}

/// True when `text` is a syntactically valid JSON object or array
pub fn is_json_text(text: &str) -> bool {
    let text = text.trim();
    let bracketed = (text.starts_with('{') && text.ends_with('}'))
        || (text.starts_with('[') && text.ends_with(']'));

    bracketed && serde_json::from_str::<IgnoredAny>(text).is_ok()
}
