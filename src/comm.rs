//! Outbound message records for the publisher/transport layer.
//!
//! These are the wire-facing shapes the gateway hands to the transport: a
//! batch of field samples, a batch of event states, and the command
//! request/response pair for write-backs. The transport owns encoding and
//! delivery; this module only defines the records and a deterministic text
//! rendering (sorted keys, millisecond timestamps) used by logs and
//! diagnostics.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::codec::CanonicalValue;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// One sampled field value with its observation instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSample {
    pub value: CanonicalValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// One sampled event state with its observation instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSample {
    pub state: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// A batch of field samples plus the tag values in force when it was taken.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushField {
    pub fields: BTreeMap<String, FieldSample>,
    pub tags: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// A batch of event states plus the tag values in force when it was taken.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushEvent {
    pub events: BTreeMap<String, EventSample>,
    pub tags: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// A write-back or control command received from upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub command_id: String,
    pub command: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub payload: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// The gateway's reply to a [`Command`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub command_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub payload: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl fmt::Display for PushField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut lines = Vec::new();
        if let Some(ts) = self.timestamp {
            lines.push(format!("Timestamp: {}", ts.format(TIMESTAMP_FORMAT)));
        }
        if !self.tags.is_empty() {
            lines.push("Tags:".to_string());
            for (key, value) in &self.tags {
                lines.push(format!("  {key}: {value}"));
            }
        }
        if !self.fields.is_empty() {
            lines.push("Fields:".to_string());
            for (key, field) in &self.fields {
                match field.timestamp {
                    Some(ts) => lines.push(format!(
                        "  {key}: {} (timestamp: {})",
                        field.value,
                        ts.format(TIMESTAMP_FORMAT)
                    )),
                    None => lines.push(format!("  {key}: {}", field.value)),
                }
            }
        }
        f.write_str(&lines.join("\n"))
    }
}

impl fmt::Display for PushEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut lines = Vec::new();
        if let Some(ts) = self.timestamp {
            lines.push(format!("Timestamp: {}", ts.format(TIMESTAMP_FORMAT)));
        }
        if !self.tags.is_empty() {
            lines.push("Tags:".to_string());
            for (key, value) in &self.tags {
                lines.push(format!("  {key}: {value}"));
            }
        }
        if !self.events.is_empty() {
            lines.push("Events:".to_string());
            for (key, event) in &self.events {
                match event.timestamp {
                    Some(ts) => lines.push(format!(
                        "  {key}: {} (timestamp: {})",
                        event.state,
                        ts.format(TIMESTAMP_FORMAT)
                    )),
                    None => lines.push(format!("  {key}: {}", event.state)),
                }
            }
        }
        f.write_str(&lines.join("\n"))
    }
}
