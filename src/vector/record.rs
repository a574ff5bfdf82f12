// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Vector records and their stored JSON payload
//!
//! The backend stores vectors separately from payloads, so a payload is the
//! record minus its vector and minus any binary media. Decoding never fails:
//! a payload that is not a JSON object comes back as
//! [`DecodedPayload::Degraded`] carrying the raw text as content. Inside an
//! object each field is read on its own, so one mistyped field falls back to
//! its default without losing the rest.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::errors::VectorStoreError;

/// Role assigned to records whose payload could not be decoded
pub const FALLBACK_ROLE: &str = "conversation";

/// Session id meaning "no session"; never excluded by session filtering
pub const NO_SESSION: i64 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Chat,
    Screen,
}

/// Media attached to a screen capture
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Raw capture bytes; never serialized
    #[serde(skip)]
    pub blob: Option<Bytes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Index position assigned by the storage layer
    #[serde(default)]
    pub id: u64,
    /// Only meaningful at insert time
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vector: Vec<f32>,
    pub content: String,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub session_id: i64,
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_ids: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<SourceType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaInfo>,
}

fn default_role() -> String {
    FALLBACK_ROLE.to_string()
}

impl VectorRecord {
    pub fn new(vector: Vec<f32>, content: impl Into<String>, session_id: i64, role: impl Into<String>) -> Self {
        Self {
            id: 0,
            vector,
            content: content.into(),
            timestamp: 0,
            session_id,
            role: role.into(),
            message_ids: None,
            source_type: None,
            media: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_source(mut self, source_type: SourceType) -> Self {
        self.source_type = Some(source_type);
        self
    }

    pub fn with_message_ids(mut self, ids: Vec<i64>) -> Self {
        self.message_ids = Some(ids);
        self
    }

    pub fn with_media(mut self, media: MediaInfo) -> Self {
        self.media = Some(media);
        self
    }

    /// Placeholder for a payload that could not be decoded
    pub fn degraded(raw: &str, id: u64) -> Self {
        Self {
            id,
            vector: Vec::new(),
            content: raw.to_string(),
            timestamp: 0,
            session_id: NO_SESSION,
            role: FALLBACK_ROLE.to_string(),
            message_ids: None,
            source_type: None,
            media: None,
        }
    }
}

/// Stored payload schema
#[derive(Debug, Serialize)]
struct StoredPayload<'a> {
    content: &'a str,
    timestamp: i64,
    session_id: i64,
    role: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_ids: Option<&'a [i64]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_type: Option<SourceType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    media: Option<MediaInfo>,
}

impl<'a> StoredPayload<'a> {
    fn from_record(record: &'a VectorRecord) -> Self {
        Self {
            content: &record.content,
            timestamp: record.timestamp,
            session_id: record.session_id,
            role: &record.role,
            message_ids: record.message_ids.as_deref(),
            source_type: record.source_type,
            media: record.media.as_ref().map(|media| MediaInfo {
                blob: None,
                duration: media.duration,
                frame_count: media.frame_count,
            }),
        }
    }
}

/// Read `key` as `T`, or `None` when it is absent or of another shape
fn field<T: DeserializeOwned>(object: &Map<String, Value>, key: &str) -> Option<T> {
    object
        .get(key)
        .and_then(|value| serde_json::from_value(value.clone()).ok())
}

/// Integer field that also accepts whole floats (`1700000000000.0`)
fn integer_field(object: &Map<String, Value>, key: &str) -> Option<i64> {
    let value = object.get(key)?;
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.is_finite() && f.fract() == 0.0)
            .map(|f| f as i64)
    })
}

fn record_from_object(object: &Map<String, Value>, index: u64) -> VectorRecord {
    VectorRecord {
        id: index,
        vector: Vec::new(),
        content: field(object, "content").unwrap_or_default(),
        timestamp: integer_field(object, "timestamp").unwrap_or(0),
        session_id: integer_field(object, "session_id").unwrap_or(NO_SESSION),
        role: field(object, "role").unwrap_or_else(default_role),
        message_ids: field(object, "message_ids"),
        source_type: field(object, "source_type"),
        media: field(object, "media"),
    }
}

/// Encode a record as a stored payload (vector and media blob stripped)
pub fn encode_payload(record: &VectorRecord) -> Result<String, VectorStoreError> {
    Ok(serde_json::to_string(&StoredPayload::from_record(record))?)
}

/// Outcome of decoding a retrieved payload
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedPayload {
    Structured(VectorRecord),
    /// Malformed payload; raw text kept as content
    Degraded { record: VectorRecord, reason: String },
}

impl DecodedPayload {
    pub fn is_degraded(&self) -> bool {
        matches!(self, DecodedPayload::Degraded { .. })
    }

    pub fn into_record(self) -> VectorRecord {
        match self {
            DecodedPayload::Structured(record) => record,
            DecodedPayload::Degraded { record, .. } => record,
        }
    }
}

/// Decode the payload stored at `index`; the record id is always `index`
pub fn decode_payload(raw: &str, index: u64) -> DecodedPayload {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(object)) => DecodedPayload::Structured(record_from_object(&object, index)),
        Ok(other) => DecodedPayload::Degraded {
            record: VectorRecord::degraded(raw, index),
            reason: format!("expected a JSON object, found {}", json_kind(&other)),
        },
        Err(e) => DecodedPayload::Degraded {
            record: VectorRecord::degraded(raw, index),
            reason: e.to_string(),
        },
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
