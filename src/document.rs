//! Content-analysis documents carried on the inbound topic.
//!
//! Each Kafka message value is a UTF-8 JSON envelope holding exactly one
//! `item_doc` plus a `msg_id` correlation string:
//!
//! ```rust
//! use insight_relay::document::Envelope;
//!
//! let payload = br#"{
//!   "msg_id": "m-1",
//!   "item_doc": {
//!     "post_id": "4983725521234",
//!     "origin_id": "7730018842210",
//!     "post_type": 1,
//!     "feature": {"sentiment": -1}
//!   }
//! }"#;
//!
//! let envelope = Envelope::decode(payload).unwrap();
//! assert_eq!(envelope.msg_id.as_deref(), Some("m-1"));
//! assert_eq!(envelope.item_doc.post_type(), Some(1));
//! assert_eq!(envelope.item_doc.post_id(), Some("4983725521234".to_string()));
//! ```
//!
//! Only `post_type` is ever interpreted. Every other field (feature
//! extraction, location, media metadata, `status`, `update_category`) is
//! opaque and forwarded byte-for-byte in meaning to the downstream API.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

/// Errors produced while decoding a message value.
///
/// Decoding is all-or-nothing: no partial document is ever returned.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The payload is not valid UTF-8.
    #[error("payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// The payload is not valid JSON.
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The payload is JSON but not an object.
    #[error("payload is not a JSON object")]
    NotAnObject,

    /// `item_doc` is `null` or not a JSON object.
    #[error("item_doc is not a JSON object")]
    InvalidDocument,

    /// The message carried no value at all.
    #[error("message has no payload")]
    Empty,
}

/// A content-analysis record (`item_doc`).
///
/// Stored as the raw JSON object. Numbers keep their original text and keys
/// keep their original order, so serialization reproduces what was consumed.
/// Accessors expose the identifying fields for logging and the `post_type`
/// discriminator for filtering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, JsonValue>);

impl Document {
    /// Wraps an already-parsed JSON object.
    pub fn from_map(fields: Map<String, JsonValue>) -> Self {
        Self(fields)
    }

    /// Returns the content-kind discriminator.
    ///
    /// Only integral JSON numbers count. Strings, booleans, `null`,
    /// fractional numbers and absent fields all yield `None`.
    pub fn post_type(&self) -> Option<i64> {
        match self.0.get("post_type")? {
            JsonValue::Number(n) => n.as_i64().or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                    .map(|f| f as i64)
            }),
            _ => None,
        }
    }

    /// Returns the post identifier rendered as a string.
    pub fn post_id(&self) -> Option<String> {
        self.id_field("post_id")
    }

    /// Returns the origin identifier rendered as a string.
    pub fn origin_id(&self) -> Option<String> {
        self.id_field("origin_id")
    }

    /// Returns the raw value of a field.
    pub fn get(&self, field: &str) -> Option<&JsonValue> {
        self.0.get(field)
    }

    /// Returns true when the document carries no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the underlying JSON object.
    pub fn as_map(&self) -> &Map<String, JsonValue> {
        &self.0
    }

    // Identifiers are large numeric strings upstream but occasionally arrive
    // as bare JSON numbers.
    fn id_field(&self, field: &str) -> Option<String> {
        match self.0.get(field)? {
            JsonValue::String(s) => Some(s.clone()),
            JsonValue::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// The decoded message value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    /// Correlation identifier assigned by the producer.
    pub msg_id: Option<String>,

    /// The carried document. Empty when the producer omitted `item_doc`;
    /// an explicit `null` fails decoding instead.
    pub item_doc: Document,
}

impl Envelope {
    /// Decodes a raw message value into an envelope.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] when the bytes are not UTF-8, not JSON,
    /// not a JSON object, or when `item_doc` is present but `null` or not an
    /// object.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let text = std::str::from_utf8(payload)?;
        let value: JsonValue = serde_json::from_str(text)?;

        let JsonValue::Object(mut root) = value else {
            return Err(DecodeError::NotAnObject);
        };

        let item_doc = match root.remove("item_doc") {
            None => Document::default(),
            Some(JsonValue::Object(fields)) => Document::from_map(fields),
            Some(_) => return Err(DecodeError::InvalidDocument),
        };

        let msg_id = match root.remove("msg_id") {
            Some(JsonValue::String(s)) => Some(s),
            Some(JsonValue::Number(n)) => Some(n.to_string()),
            _ => None,
        };

        Ok(Self { msg_id, item_doc })
    }
}

/// Request body posted to the ingestion API: `{"item_doc": <document>}`.
#[derive(Debug, Serialize)]
pub struct SyncRequest<'a> {
    /// The document being forwarded.
    pub item_doc: &'a Document,
}
