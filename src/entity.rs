//! Entity-level expression declarations.
//!
//! The layer above the device model aggregates device variables into entity
//! fields and events, each computed by an expression over the variables'
//! cache methods. This module only carries the declarations; compilation
//! and evaluation go through the scripting adapter like any other script.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One derived field of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub key: String,
    pub expression: String,
    /// Treat the field's value as a tag instead of a field sample.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub as_tag: bool,
}

/// One derived event of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub key: String,
    pub expression: String,
    /// Optional event category.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub category: String,
    /// Optional severity level (1 critical, 2 warning, ...).
    #[serde(default, skip_serializing_if = "is_zero")]
    pub level: i32,
    /// Optional human-readable message template.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

fn is_zero(level: &i32) -> bool {
    *level == 0
}

/// The entity model: named derived fields and events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityModel {
    #[serde(default)]
    pub fields: BTreeMap<String, Field>,
    #[serde(default)]
    pub events: BTreeMap<String, Event>,
}
