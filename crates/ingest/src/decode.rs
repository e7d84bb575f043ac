//! Envelope decoding
//!
//! A message names its destination in a header (default `table`) and carries
//! the fields object as its body. Messages without the header use the legacy
//! body `{"table": "<destination>", "values": {...}}`.

use chq_broker::Headers;
use chq_store::{RawRecord, is_valid_destination};
use serde_json::{Map, Value};

/// Legacy body key naming the destination
const LEGACY_DESTINATION_KEY: &str = "table";

/// Legacy body key holding the fields
const LEGACY_VALUES_KEY: &str = "values";

/// Why a message could not be decoded
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Body is not valid JSON
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Body (or its `values`) is not a JSON object
    #[error("expected a JSON object for {0}")]
    NotObject(&'static str),

    /// Neither the header nor the legacy body names a destination
    #[error("no destination in header '{header}' or body")]
    MissingDestination { header: String },

    /// Destination is not a plain identifier
    #[error("invalid destination name '{0}'")]
    InvalidDestination(String),

    /// The record has no fields
    #[error("record for '{0}' has no fields")]
    Empty(String),
}

/// Decode a message into a raw record
pub fn decode(
    content: &[u8],
    headers: &Headers,
    destination_header: &str,
) -> Result<RawRecord, DecodeError> {
    let body: Value = serde_json::from_slice(content)?;

    let (destination, fields) = match headers.get(destination_header) {
        Some(destination) if !destination.is_empty() => {
            let Value::Object(fields) = body else {
                return Err(DecodeError::NotObject("body"));
            };
            (destination.clone(), fields)
        }
        _ => legacy(body, destination_header)?,
    };

    if !is_valid_destination(&destination) {
        return Err(DecodeError::InvalidDestination(destination));
    }
    if fields.is_empty() {
        return Err(DecodeError::Empty(destination));
    }

    Ok(RawRecord::new(destination, fields))
}

fn legacy(body: Value, header: &str) -> Result<(String, Map<String, Value>), DecodeError> {
    let Value::Object(mut body) = body else {
        return Err(DecodeError::NotObject("body"));
    };

    let destination = match body.remove(LEGACY_DESTINATION_KEY) {
        Some(Value::String(s)) if !s.is_empty() => s,
        _ => {
            return Err(DecodeError::MissingDestination {
                header: header.to_string(),
            });
        }
    };

    match body.remove(LEGACY_VALUES_KEY) {
        Some(Value::Object(fields)) => Ok((destination, fields)),
        _ => Err(DecodeError::NotObject("values")),
    }
}
