//! Webhook wire formats
//!
//! The webhook is free-form: replies may be JSON with an `output` or
//! `text` field, arbitrary JSON, or plain text, and stored history comes
//! back in the automation platform's serialized message shape. Everything
//! here is best-effort with empty defaults, never an error.

use serde::Deserialize;
use serde_json::Value;

use crate::message::Message;

/// A file attached to an outgoing message
#[derive(Debug, Clone)]
pub struct Attachment {
    /// File name reported in the multipart form
    pub file_name: String,
    /// MIME type of the content
    pub mime_type: mime::Mime,
    /// Raw file content
    pub data: Vec<u8>,
}

impl Attachment {
    /// Create a new attachment
    pub fn new(file_name: impl Into<String>, mime_type: mime::Mime, data: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type,
            data,
        }
    }
}

/// History envelope returned by `action=loadPreviousSession`
#[derive(Debug, Deserialize, Default)]
struct HistoryEnvelope {
    #[serde(default)]
    data: Vec<HistoryEntry>,
}

/// One stored message in the platform's serialized shape
#[derive(Debug, Deserialize, Default)]
struct HistoryEntry {
    /// Type identifier; contains "HumanMessage" for user messages
    #[serde(default)]
    id: String,
    #[serde(default)]
    kwargs: HistoryKwargs,
}

#[derive(Debug, Deserialize, Default)]
struct HistoryKwargs {
    #[serde(default)]
    content: String,
}

/// Map a history response body to messages
///
/// Any parse failure or unexpected shape yields an empty history. Each
/// mapped message gets a fresh unique id; original timestamps are not
/// preserved by the wire format, so creation time is now.
pub fn map_history(body: &str) -> Vec<Message> {
    let envelope: HistoryEnvelope = serde_json::from_str(body).unwrap_or_default();
    envelope
        .data
        .into_iter()
        .map(|entry| {
            if entry.id.contains("HumanMessage") {
                Message::user(entry.kwargs.content)
            } else {
                Message::bot(entry.kwargs.content)
            }
        })
        .collect()
}

/// Extract the bot reply text from a send response body
///
/// Prefers a string `output` field, then `text`. A body that is not
/// valid JSON is passed through as the reply itself. A non-empty JSON
/// object with neither field becomes its pretty-printed dump; anything
/// else becomes the empty string.
pub fn extract_reply(body: &str) -> String {
    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(_) => return body.to_string(),
    };

    let content = value
        .get("output")
        .and_then(Value::as_str)
        .or_else(|| value.get("text").and_then(Value::as_str))
        .unwrap_or("");

    if !content.is_empty() {
        return content.to_string();
    }

    if let Value::Object(map) = &value {
        if !map.is_empty() {
            return serde_json::to_string_pretty(&value).unwrap_or_default();
        }
    }

    String::new()
}
