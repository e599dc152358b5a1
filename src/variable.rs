//! Named tag variables and their canonical series caches.
//!
//! A [`Variable`] is one named tag of the device model: either raw (read
//! from a controller connection/address) or computed (a script evaluated by
//! the expression engine, mutually exclusive with a connection). At
//! configuration time the declared type name is resolved to a canonical
//! storage type and a series cache of exactly that type is instantiated.
//!
//! The cache slot is a closed tagged union over the four canonical cache
//! types; every call site matches it exhaustively, and `None` marks a
//! variable whose declared type never resolved (such a variable ingests and
//! publishes nothing, by design).

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::cache::SeriesCache;
use crate::codec::{self, CanonicalKind, CanonicalValue, DataType, Value};
use crate::error::{TelemetryError, TelemetryResult};

/// Default history retention when a variable declares no cache duration.
pub const DEFAULT_CACHE_DURATION: Duration = Duration::from_secs(60);

/// The canonical series cache of one variable.
///
/// Closed union over the four canonical cache types; the `Arc` makes the
/// slot cheap to share with the expression environment.
#[derive(Debug, Clone)]
pub enum SeriesSlot {
    Float(Arc<SeriesCache<f64>>),
    Bool(Arc<SeriesCache<bool>>),
    Text(Arc<SeriesCache<String>>),
    Bytes(Arc<SeriesCache<Vec<u8>>>),
}

impl SeriesSlot {
    /// The canonical kind this slot stores.
    pub fn kind(&self) -> CanonicalKind {
        match self {
            SeriesSlot::Float(_) => CanonicalKind::Float,
            SeriesSlot::Bool(_) => CanonicalKind::Bool,
            SeriesSlot::Text(_) => CanonicalKind::Text,
            SeriesSlot::Bytes(_) => CanonicalKind::Bytes,
        }
    }

    /// Current point count of the underlying cache.
    pub fn len(&self) -> usize {
        match self {
            SeriesSlot::Float(c) => c.len(),
            SeriesSlot::Bool(c) => c.len(),
            SeriesSlot::Text(c) => c.len(),
            SeriesSlot::Bytes(c) => c.len(),
        }
    }

    /// True when the underlying cache holds no points.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A named tag with a resolved canonical type and an owned series cache.
///
/// Constructed from configuration; the serde-visible fields are the
/// configuration surface, the skipped fields are resolved runtime state
/// filled in by [`Variable::resolve`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variable {
    /// Unique identifier-shaped name.
    pub key: String,

    /// Connection name for raw variables; empty for computed ones.
    #[serde(default)]
    pub connection: String,

    /// Controller address of a raw variable.
    #[serde(default)]
    pub address: String,

    /// Expression source of a computed variable (mutually exclusive with a
    /// connection).
    #[serde(default)]
    pub script: String,

    /// Absolute change threshold for change detection. Takes priority over
    /// the percentage threshold when both are set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_threshold: Option<f64>,

    /// Percentage change threshold for change detection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pct_threshold: Option<f64>,

    /// Scale factor applied to numeric readings on write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,

    /// Offset added to numeric readings on write, after scaling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<f64>,

    /// Whether the variable may be written back to the controller.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub writable: bool,

    /// Publish as a tag (requires a string canonical type).
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub as_tag: bool,

    /// Publish as an event (requires a boolean canonical type).
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub as_event: bool,

    /// Declared data-type name, resolved by the codec.
    pub data_type: String,

    /// Routine publish interval; zero means "publish only on change",
    /// absent means "never publish".
    #[serde(
        default,
        with = "humantime_serde",
        skip_serializing_if = "Option::is_none"
    )]
    pub publish_cycle: Option<Duration>,

    /// History retention; defaults to one minute when absent.
    #[serde(
        default,
        with = "humantime_serde",
        skip_serializing_if = "Option::is_none"
    )]
    pub cache_duration: Option<Duration>,

    #[serde(skip)]
    resolved: Option<DataType>,

    #[serde(skip)]
    width: usize,

    #[serde(skip)]
    slot: Option<SeriesSlot>,

    /// Latest published point. Owned by the publish scheduler: only
    /// [`Variable::push_values`] mutates it.
    #[serde(skip)]
    pub(crate) latest_push: Option<(CanonicalValue, DateTime<Utc>)>,

    /// Compiled expression of a computed variable.
    #[serde(skip)]
    pub(crate) program: Option<rhai::AST>,
}

impl Variable {
    /// Resolve the declared type, instantiate the cache, and check the
    /// classification constraints.
    ///
    /// Returns violation messages as plain strings so the model layer can
    /// aggregate them across all variables instead of failing fast. A
    /// declared type that does not resolve is only an error for raw
    /// variables; a computed variable is left cache-less (it is excluded
    /// from ingestion and publishing).
    pub(crate) fn resolve(&mut self) -> Result<(), String> {
        match DataType::resolve(&self.data_type) {
            Ok((data_type, width)) => {
                self.resolved = Some(data_type);
                self.width = width;
            }
            Err(err) if !self.connection.is_empty() => return Err(err.to_string()),
            Err(_) => {}
        }

        let kind = self.resolved.map(DataType::canonical_kind);
        if self.as_tag && kind != Some(CanonicalKind::Text) {
            return Err(format!(
                "variable {} with data type {} cannot be used as a tag",
                self.key, self.data_type
            ));
        }
        if self.as_event && kind != Some(CanonicalKind::Bool) {
            return Err(format!(
                "variable {} with data type {} cannot be used as an event",
                self.key, self.data_type
            ));
        }

        let expiry = self.cache_duration.unwrap_or(DEFAULT_CACHE_DURATION);
        self.cache_duration = Some(expiry);
        self.slot = kind.map(|kind| match kind {
            CanonicalKind::Float => SeriesSlot::Float(Arc::new(SeriesCache::new(expiry))),
            CanonicalKind::Bool => SeriesSlot::Bool(Arc::new(SeriesCache::new(expiry))),
            CanonicalKind::Text => SeriesSlot::Text(Arc::new(SeriesCache::new(expiry))),
            CanonicalKind::Bytes => SeriesSlot::Bytes(Arc::new(SeriesCache::new(expiry))),
        });
        Ok(())
    }

    /// The resolved declared type, if the type name resolved.
    pub fn resolved_type(&self) -> Option<DataType> {
        self.resolved
    }

    /// Byte width of the resolved declared type on the wire.
    pub fn byte_width(&self) -> usize {
        self.width
    }

    /// The canonical series cache, if the declared type resolved.
    pub fn series(&self) -> Option<&SeriesSlot> {
        self.slot.as_ref()
    }

    /// The latest published value and timestamp, absent until the first push.
    pub fn latest_published(&self) -> Option<&(CanonicalValue, DateTime<Utc>)> {
        self.latest_push.as_ref()
    }

    /// Whether this variable is computed by a script.
    pub fn is_computed(&self) -> bool {
        self.connection.is_empty() && !self.script.is_empty()
    }

    /// Ingest one reading.
    ///
    /// Numeric canonical types canonicalize through [`codec::to_f64`] and
    /// then apply scale and offset; boolean, string, and byte-packed types
    /// go through the codec's bounds-checked conversion. An absent timestamp
    /// defaults to now.
    ///
    /// # Errors
    ///
    /// Conversion failures propagate; a value whose converted shape does not
    /// match the cache fails with [`TelemetryError::CacheMismatch`]; a
    /// variable with no resolved type fails with
    /// [`TelemetryError::UnsupportedType`].
    pub fn write_value(&self, value: &Value, timestamp: Option<DateTime<Utc>>) -> TelemetryResult<()> {
        let (data_type, slot) = match (self.resolved, &self.slot) {
            (Some(data_type), Some(slot)) => (data_type, slot),
            _ => {
                return Err(TelemetryError::UnsupportedType {
                    actual: self.data_type.clone(),
                })
            }
        };
        match slot {
            SeriesSlot::Float(cache) => {
                let mut v = codec::to_f64(value)?;
                if let Some(scale) = self.scale {
                    v *= scale;
                }
                if let Some(offset) = self.offset {
                    v += offset;
                }
                cache.add_point(v, timestamp);
            }
            SeriesSlot::Bool(cache) => match data_type.convert(value)? {
                CanonicalValue::Bool(b) => cache.add_point(b, timestamp),
                _ => return Err(self.mismatch()),
            },
            SeriesSlot::Text(cache) => match data_type.convert(value)? {
                CanonicalValue::Text(s) => cache.add_point(s, timestamp),
                _ => return Err(self.mismatch()),
            },
            SeriesSlot::Bytes(cache) => match data_type.convert(value)? {
                CanonicalValue::Bytes(b) => cache.add_point(b, timestamp),
                _ => return Err(self.mismatch()),
            },
        }
        Ok(())
    }

    /// Newest value, two-point change flag, and newest timestamp.
    ///
    /// For numeric variables the change flag honors the configured
    /// thresholds; for the other canonical types it is plain two-point
    /// inequality. `None` when the type never resolved or nothing has been
    /// ingested yet.
    pub fn read(&self) -> Option<(CanonicalValue, bool, DateTime<Utc>)> {
        match self.slot.as_ref()? {
            SeriesSlot::Float(cache) => {
                let point = cache.point()?;
                let mut changed = false;
                if let Some(threshold) = self.diff_threshold {
                    changed = cache.diff_exceeds(threshold).unwrap_or(false);
                }
                if let Some(threshold) = self.pct_threshold {
                    changed = cache.pct_change_exceeds(threshold).unwrap_or(false);
                }
                Some((CanonicalValue::Float(point.value), changed, point.timestamp))
            }
            SeriesSlot::Bool(cache) => {
                let point = cache.point()?;
                Some((CanonicalValue::Bool(point.value), cache.changed(), point.timestamp))
            }
            SeriesSlot::Text(cache) => {
                let point = cache.point()?;
                Some((CanonicalValue::Text(point.value), cache.changed(), point.timestamp))
            }
            SeriesSlot::Bytes(cache) => {
                let point = cache.point()?;
                Some((CanonicalValue::Bytes(point.value), cache.changed(), point.timestamp))
            }
        }
    }

    /// Stable identity digest over the configured fields.
    ///
    /// Two variables with identical configuration hash identically; any
    /// configured difference (thresholds, cycles, classification) changes
    /// the digest.
    pub fn identity_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.key.as_bytes());
        hasher.update(self.connection.as_bytes());
        hasher.update(self.address.as_bytes());
        hasher.update(self.script.as_bytes());
        hasher.update(self.data_type.as_bytes());
        if let Some(threshold) = self.diff_threshold {
            hasher.update(format!("{threshold:.8}").as_bytes());
        }
        if let Some(threshold) = self.pct_threshold {
            hasher.update(format!("{threshold:.8}").as_bytes());
        }
        if let Some(scale) = self.scale {
            hasher.update(format!("{scale:.8}").as_bytes());
        }
        if let Some(offset) = self.offset {
            hasher.update(format!("{offset:.8}").as_bytes());
        }
        hasher.update(format!("{}", self.writable).as_bytes());
        hasher.update(format!("{}", self.as_tag).as_bytes());
        hasher.update(format!("{}", self.as_event).as_bytes());
        if let Some(duration) = self.cache_duration {
            hasher.update(humantime::format_duration(duration).to_string().as_bytes());
        }
        if let Some(cycle) = self.publish_cycle {
            hasher.update(humantime::format_duration(cycle).to_string().as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }

    fn mismatch(&self) -> TelemetryError {
        TelemetryError::CacheMismatch {
            key: self.key.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variable(key: &str, data_type: &str) -> Variable {
        let mut v: Variable = serde_json::from_value(serde_json::json!({
            "key": key,
            "connection": "plc1",
            "address": "DB1.DBD0",
            "data_type": data_type,
        }))
        .unwrap();
        v.resolve().unwrap();
        v
    }

    #[test]
    fn resolve_builds_matching_cache() {
        let v = variable("temperature", "Float32");
        assert_eq!(v.resolved_type(), Some(DataType::Float32));
        assert_eq!(v.byte_width(), 4);
        assert_eq!(v.series().map(SeriesSlot::kind), Some(CanonicalKind::Float));
        assert_eq!(v.cache_duration, Some(DEFAULT_CACHE_DURATION));
        let Some(SeriesSlot::Float(cache)) = v.series() else {
            panic!("expected float cache");
        };
        assert_eq!(cache.expiry(), DEFAULT_CACHE_DURATION);

        let v = variable("running", "Bool");
        assert!(matches!(v.series(), Some(SeriesSlot::Bool(_))));
        let v = variable("message", "String[8]");
        assert!(matches!(v.series(), Some(SeriesSlot::Text(_))));
        let v = variable("flags", "Word");
        assert!(matches!(v.series(), Some(SeriesSlot::Bytes(_))));
    }

    #[test]
    fn unresolved_type_is_fatal_only_for_raw_variables() {
        let mut raw: Variable = serde_json::from_value(serde_json::json!({
            "key": "bad",
            "connection": "plc1",
            "data_type": "Quaternion",
        }))
        .unwrap();
        assert!(raw.resolve().is_err());

        let mut computed: Variable = serde_json::from_value(serde_json::json!({
            "key": "calc",
            "script": "1 + 2",
            "data_type": "Quaternion",
        }))
        .unwrap();
        assert!(computed.resolve().is_ok());
        assert!(computed.series().is_none());
    }

    #[test]
    fn classification_constraints_are_enforced() {
        let mut v: Variable = serde_json::from_value(serde_json::json!({
            "key": "t",
            "connection": "plc1",
            "data_type": "Float32",
            "as_tag": true,
        }))
        .unwrap();
        let err = v.resolve().unwrap_err();
        assert!(err.contains("cannot be used as a tag"));

        let mut v: Variable = serde_json::from_value(serde_json::json!({
            "key": "e",
            "connection": "plc1",
            "data_type": "Int16",
            "as_event": true,
        }))
        .unwrap();
        let err = v.resolve().unwrap_err();
        assert!(err.contains("cannot be used as an event"));
    }

    #[test]
    fn numeric_write_applies_scale_then_offset() {
        let mut v = variable("temperature", "Int16");
        v.scale = Some(0.1);
        v.offset = Some(-5.0);
        v.write_value(&Value::Int(250), None).unwrap();
        let Some(SeriesSlot::Float(cache)) = v.series() else {
            panic!("expected float cache");
        };
        assert!((cache.value() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn bool_write_coerces_numerics() {
        let v = variable("running", "Bool");
        v.write_value(&Value::Int(1), None).unwrap();
        let Some(SeriesSlot::Bool(cache)) = v.series() else {
            panic!("expected bool cache");
        };
        assert!(cache.value());
    }

    #[test]
    fn word_write_packs_bytes() {
        let v = variable("flags", "Word");
        v.write_value(&Value::UInt(0x0102), None).unwrap();
        let Some(SeriesSlot::Bytes(cache)) = v.series() else {
            panic!("expected bytes cache");
        };
        assert_eq!(cache.value(), vec![0x02, 0x01]);
    }

    #[test]
    fn write_to_unresolved_variable_fails() {
        let mut v: Variable = serde_json::from_value(serde_json::json!({
            "key": "calc",
            "script": "1 + 2",
            "data_type": "Nope",
        }))
        .unwrap();
        v.resolve().unwrap();
        assert!(matches!(
            v.write_value(&Value::Int(1), None),
            Err(TelemetryError::UnsupportedType { .. })
        ));
    }

    #[test]
    fn read_reports_threshold_aware_change() {
        let mut v = variable("temperature", "Float64");
        v.diff_threshold = Some(5.0);
        assert!(v.read().is_none());
        v.write_value(&Value::Float(10.0), None).unwrap();
        v.write_value(&Value::Float(12.0), Some(Utc::now() + chrono::Duration::milliseconds(1)))
            .unwrap();
        let (value, changed, _) = v.read().unwrap();
        assert_eq!(value, CanonicalValue::Float(12.0));
        assert!(!changed, "2.0 step does not exceed 5.0 threshold");
    }

    #[test]
    fn duration_fields_round_trip_as_strings() {
        let v: Variable = serde_json::from_value(serde_json::json!({
            "key": "t",
            "connection": "plc1",
            "data_type": "Float32",
            "publish_cycle": "5s",
            "cache_duration": "2m",
        }))
        .unwrap();
        assert_eq!(v.publish_cycle, Some(Duration::from_secs(5)));
        assert_eq!(v.cache_duration, Some(Duration::from_secs(120)));

        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["publish_cycle"], "5s");
        assert_eq!(json["cache_duration"], "2m");
    }

    #[test]
    fn identity_hash_tracks_configuration() {
        let a = variable("temperature", "Float32");
        let b = variable("temperature", "Float32");
        assert_eq!(a.identity_hash(), b.identity_hash());

        let mut c = variable("temperature", "Float32");
        c.diff_threshold = Some(0.5);
        assert_ne!(a.identity_hash(), c.identity_hash());
    }
}
