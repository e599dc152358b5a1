//! The device model: connections plus named variables.
//!
//! The model layer hands the gateway one JSON document describing every
//! controller connection and variable. Construction is all-or-nothing with
//! aggregate reporting: every violation found (bad key shape, key/field
//! mismatch, classification constraint, script compile failure, type
//! resolution failure) is collected, sorted, and returned as one
//! [`TelemetryError::InvalidConfig`], so the configuration author fixes the
//! whole document in one pass instead of peeling errors one at a time.
//!
//! A constructed model also assembles the expression environment (every
//! variable's series handle keyed by name) and the outbound snapshots the
//! publisher sends between scheduled pushes.

use std::collections::BTreeMap;

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::debug;

use serde::{Deserialize, Serialize};

use crate::codec::{CanonicalValue, Value};
use crate::comm::{EventSample, FieldSample, PushEvent, PushField};
use crate::error::{TelemetryError, TelemetryResult};
use crate::scripting::{ExprEngine, SeriesHandle};
use crate::variable::Variable;

/// Variable keys are identifier-shaped.
static KEY_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    let pattern = Regex::new(r"^\w+$").expect("key pattern is valid");
    pattern
});

/// One device's connections and variables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceModel {
    /// Connection name to connection type.
    #[serde(default)]
    pub connections: BTreeMap<String, String>,

    /// Variable name to variable definition.
    #[serde(default)]
    pub variables: BTreeMap<String, Variable>,
}

impl DeviceModel {
    /// Deserialize and finalize a model from JSON.
    ///
    /// # Errors
    ///
    /// [`TelemetryError::Json`] for malformed JSON;
    /// [`TelemetryError::InvalidConfig`] with every semantic violation found.
    pub fn from_json(data: &str) -> TelemetryResult<Self> {
        let mut model: DeviceModel = serde_json::from_str(data)?;
        model.finalize()?;
        Ok(model)
    }

    /// Serialize the model back to JSON (durations render as humantime
    /// strings; resolved runtime state is not part of the document).
    ///
    /// # Errors
    ///
    /// [`TelemetryError::Json`] should serialization fail.
    pub fn to_json(&self) -> TelemetryResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Resolve every variable and collect all configuration violations.
    ///
    /// Called by [`DeviceModel::from_json`]; public so hand-built models
    /// (tests, tooling) can be finalized the same way.
    ///
    /// # Errors
    ///
    /// [`TelemetryError::InvalidConfig`] listing every violation, sorted.
    pub fn finalize(&mut self) -> TelemetryResult<()> {
        let engine = ExprEngine::new();
        let mut errors = Vec::new();

        for (key, variable) in self.variables.iter_mut() {
            if !KEY_RE.is_match(key) {
                errors.push(format!("invalid variable key: {key}"));
            }
            if *key != variable.key {
                errors.push(format!(
                    "variable key mismatch: {key} != {}",
                    variable.key
                ));
            }
            if let Err(message) = variable.resolve() {
                errors.push(message);
            }
            if variable.is_computed() {
                match engine.compile(&variable.script) {
                    Ok(ast) => variable.program = Some(ast),
                    Err(err) => errors.push(format!("{key}: {err}")),
                }
            }
        }

        if !errors.is_empty() {
            errors.sort();
            return Err(TelemetryError::InvalidConfig(errors));
        }
        debug!(
            connections = self.connections.len(),
            variables = self.variables.len(),
            "device model finalized"
        );
        Ok(())
    }

    /// The expression environment: every resolved variable's series handle,
    /// keyed by variable name.
    pub fn script_scope(&self) -> rhai::Scope<'static> {
        let mut scope = rhai::Scope::new();
        for (key, variable) in &self.variables {
            if let Some(slot) = variable.series() {
                scope.push(key.clone(), SeriesHandle::new(slot.clone()));
            }
        }
        scope
    }

    /// Evaluate one computed variable's compiled script against the live
    /// environment and return the dynamic result.
    ///
    /// The caller feeds the result back through
    /// [`Variable::write_value`](crate::variable::Variable::write_value);
    /// the split keeps evaluation read-only over the model.
    ///
    /// # Errors
    ///
    /// [`TelemetryError::Script`] for unknown/uncompiled variables and
    /// evaluation failures.
    pub fn evaluate(&self, engine: &ExprEngine, key: &str) -> TelemetryResult<Value> {
        let variable = self
            .variables
            .get(key)
            .ok_or_else(|| TelemetryError::Script(format!("unknown variable: {key}")))?;
        let ast = variable
            .program
            .as_ref()
            .ok_or_else(|| TelemetryError::Script(format!("variable {key} has no script")))?;
        let mut scope = self.script_scope();
        engine.eval(ast, &mut scope)
    }

    /// Stable identity digest of the whole model configuration.
    pub fn identity_hash(&self) -> String {
        let mut hasher = Sha256::new();
        for (name, kind) in &self.connections {
            hasher.update(format!("{name}:{kind};").as_bytes());
        }
        for (key, variable) in &self.variables {
            hasher.update(format!("{key}:{};", variable.identity_hash()).as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }

    /// Current field values of every non-event variable, with `as_tag`
    /// variables folded into the tag set. Variables that never resolved or
    /// never ingested are skipped.
    pub fn snapshot_fields(&self) -> PushField {
        let mut push = PushField {
            timestamp: Some(Utc::now()),
            ..PushField::default()
        };
        for (key, variable) in &self.variables {
            if variable.as_event {
                continue;
            }
            let Some((value, _, timestamp)) = variable.read() else {
                continue;
            };
            if variable.as_tag {
                if let CanonicalValue::Text(text) = value {
                    push.tags.insert(key.clone(), text);
                }
            } else {
                push.fields.insert(
                    key.clone(),
                    FieldSample {
                        value,
                        timestamp: Some(timestamp),
                    },
                );
            }
        }
        push
    }

    /// Current states of every event variable.
    pub fn snapshot_events(&self) -> PushEvent {
        let mut push = PushEvent {
            timestamp: Some(Utc::now()),
            ..PushEvent::default()
        };
        for (key, variable) in &self.variables {
            if !variable.as_event {
                continue;
            }
            let Some((CanonicalValue::Bool(state), _, timestamp)) = variable.read() else {
                continue;
            };
            push.events.insert(
                key.clone(),
                EventSample {
                    state,
                    timestamp: Some(timestamp),
                },
            );
        }
        push
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::DataType;

    const MODEL_JSON: &str = r#"{
        "connections": {
            "plc1": "modbus",
            "plc2": "ethernet"
        },
        "variables": {
            "temperature": {
                "key": "temperature",
                "connection": "plc1",
                "address": "DB1.DBD0",
                "data_type": "Float32",
                "publish_cycle": "5s",
                "cache_duration": "2m",
                "diff_threshold": 0.5,
                "scale": 2.0,
                "offset": 1.0
            },
            "running": {
                "key": "running",
                "connection": "plc1",
                "address": "DB1.DBX0.0",
                "data_type": "Bool",
                "writable": true
            },
            "counter": {
                "key": "counter",
                "connection": "plc2",
                "address": "DB2.DBW0",
                "data_type": "UInt16"
            },
            "message": {
                "key": "message",
                "connection": "plc2",
                "address": "DB2.DBB10",
                "data_type": "String"
            },
            "calculated": {
                "key": "calculated",
                "script": "temperature.Value() * 0.5",
                "data_type": "Float64"
            }
        }
    }"#;

    #[test]
    fn parses_and_resolves_a_multi_type_model() {
        let model = DeviceModel::from_json(MODEL_JSON).unwrap();
        assert_eq!(model.connections.len(), 2);
        assert_eq!(model.variables.len(), 5);

        let expected = [
            ("temperature", DataType::Float32),
            ("running", DataType::Bool),
            ("counter", DataType::UInt16),
            ("message", DataType::String),
            ("calculated", DataType::Float64),
        ];
        for (key, data_type) in expected {
            assert_eq!(
                model.variables[key].resolved_type(),
                Some(data_type),
                "{key}"
            );
        }

        let temperature = &model.variables["temperature"];
        assert_eq!(temperature.publish_cycle, Some(std::time::Duration::from_secs(5)));
        assert_eq!(
            temperature.cache_duration,
            Some(std::time::Duration::from_secs(120))
        );
        assert_eq!(temperature.diff_threshold, Some(0.5));

        // Computed variable got its script compiled.
        assert!(model.variables["calculated"].is_computed());
        assert!(model.variables["calculated"].program.is_some());
    }

    #[test]
    fn collects_all_violations_sorted() {
        let json = r#"{
            "connections": {},
            "variables": {
                "bad-key": {
                    "key": "bad-key",
                    "connection": "plc1",
                    "data_type": "Float32"
                },
                "mismatch": {
                    "key": "other",
                    "connection": "plc1",
                    "data_type": "Float32"
                },
                "broken": {
                    "key": "broken",
                    "script": "invalid syntax +++",
                    "data_type": "Float64"
                },
                "tagged": {
                    "key": "tagged",
                    "connection": "plc1",
                    "data_type": "Float32",
                    "as_tag": true
                }
            }
        }"#;
        let err = DeviceModel::from_json(json).unwrap_err();
        let TelemetryError::InvalidConfig(errors) = err else {
            panic!("expected aggregate config error");
        };
        assert_eq!(errors.len(), 4);
        let mut sorted = errors.clone();
        sorted.sort();
        assert_eq!(errors, sorted, "violations are reported sorted");
        assert!(errors.iter().any(|e| e.contains("invalid variable key")));
        assert!(errors.iter().any(|e| e.contains("key mismatch")));
        assert!(errors.iter().any(|e| e.contains("broken")));
        assert!(errors.iter().any(|e| e.contains("cannot be used as a tag")));
    }

    #[test]
    fn json_round_trip_preserves_identity() {
        let model = DeviceModel::from_json(MODEL_JSON).unwrap();
        let json = model.to_json().unwrap();
        let reparsed = DeviceModel::from_json(&json).unwrap();
        assert_eq!(model.identity_hash(), reparsed.identity_hash());
    }

    #[test]
    fn identity_hash_tracks_model_changes() {
        let a = DeviceModel::from_json(MODEL_JSON).unwrap();
        let mut b = DeviceModel::from_json(MODEL_JSON).unwrap();
        assert_eq!(a.identity_hash(), b.identity_hash());

        b.connections.insert("plc3".to_string(), "tcp".to_string());
        assert_ne!(a.identity_hash(), b.identity_hash());
    }

    #[test]
    fn evaluates_computed_variables_against_live_caches() {
        let model = DeviceModel::from_json(MODEL_JSON).unwrap();
        // Raw reading 20.5 scaled by 2 and offset by 1 -> 42 in the cache.
        model.variables["temperature"]
            .write_value(&Value::Float(20.5), None)
            .unwrap();

        let engine = ExprEngine::new();
        let result = model.evaluate(&engine, "calculated").unwrap();
        assert_eq!(result, Value::Float(21.0));

        // The result feeds back through the normal ingestion path.
        model.variables["calculated"]
            .write_value(&result, None)
            .unwrap();
        let (value, _, _) = model.variables["calculated"].read().unwrap();
        assert_eq!(value, CanonicalValue::Float(21.0));
    }

    #[test]
    fn snapshots_fold_tags_and_split_events() {
        let json = r#"{
            "connections": {"plc1": "modbus"},
            "variables": {
                "temperature": {
                    "key": "temperature",
                    "connection": "plc1",
                    "data_type": "Float64"
                },
                "line": {
                    "key": "line",
                    "connection": "plc1",
                    "data_type": "String",
                    "as_tag": true
                },
                "overheat": {
                    "key": "overheat",
                    "connection": "plc1",
                    "data_type": "Bool",
                    "as_event": true
                }
            }
        }"#;
        let model = DeviceModel::from_json(json).unwrap();
        model.variables["temperature"]
            .write_value(&Value::Float(21.5), None)
            .unwrap();
        model.variables["line"]
            .write_value(&Value::Text("packing".into()), None)
            .unwrap();
        model.variables["overheat"]
            .write_value(&Value::Bool(true), None)
            .unwrap();

        let fields = model.snapshot_fields();
        assert_eq!(fields.fields.len(), 1);
        assert_eq!(
            fields.fields["temperature"].value,
            CanonicalValue::Float(21.5)
        );
        assert_eq!(fields.tags["line"], "packing");
        assert!(!fields.fields.contains_key("overheat"));

        let events = model.snapshot_events();
        assert_eq!(events.events.len(), 1);
        assert!(events.events["overheat"].state);
    }

    #[test]
    fn empty_model_initializes_cleanly() {
        let model = DeviceModel::from_json("{}").unwrap();
        assert!(model.connections.is_empty());
        assert!(model.variables.is_empty());
    }
}
