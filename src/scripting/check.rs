//! Script validation against type-derived sample values.
//!
//! Configuration tooling wants to reject a broken calculated-variable
//! script before the gateway ever runs it. Given the declared types of the
//! controller variables a script may reference, this module builds an
//! environment of random in-range sample values (dotted keys become nested
//! maps), compiles and dry-runs the script, and reports the declared-type
//! name of the result.

use std::collections::BTreeMap;

use rhai::{Dynamic, Scope};

use crate::codec::DataType;
use crate::error::{TelemetryError, TelemetryResult};
use crate::scripting::engine::{value_to_dynamic, ExprEngine};

/// An environment value: either a sampled leaf or a nested namespace.
enum Node {
    Leaf(Dynamic),
    Branch(BTreeMap<String, Node>),
}

impl Node {
    fn into_dynamic(self) -> Dynamic {
        match self {
            Node::Leaf(value) => value,
            Node::Branch(children) => {
                let mut map = rhai::Map::new();
                for (key, child) in children {
                    map.insert(key.into(), child.into_dynamic());
                }
                Dynamic::from_map(map)
            }
        }
    }
}

/// Dry-run a script against sample values of the declared variable types
/// and return the inferred result-type name (`"bool"`, `"int"`, `"float"`,
/// or `"string"`).
///
/// `declared` maps variable keys (possibly dotted, `station.line.temp`) to
/// declared data-type names.
///
/// # Errors
///
/// [`TelemetryError::UnknownType`] for an unresolvable declared type;
/// [`TelemetryError::Script`] for an invalid key, a compile or runtime
/// failure, or a result type outside the supported set.
pub fn validate_script(
    declared: &BTreeMap<String, String>,
    script: &str,
) -> TelemetryResult<String> {
    let mut root: BTreeMap<String, Node> = BTreeMap::new();

    for (key, type_name) in declared {
        let segments: Vec<&str> = key.split('.').collect();
        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(TelemetryError::Script(format!(
                "invalid variable key: {key}"
            )));
        }
        let (data_type, _) = DataType::resolve(type_name)?;
        let sample = value_to_dynamic(&data_type.sample_value());
        insert(&mut root, &segments, sample);
    }

    let mut scope = Scope::new();
    for (name, node) in root {
        scope.push_dynamic(name, node.into_dynamic());
    }

    let engine = ExprEngine::new();
    let ast = engine.compile(script)?;
    let result = engine.eval(&ast, &mut scope)?;

    infer_type_name(&result).ok_or_else(|| {
        TelemetryError::Script("unsupported result data type".to_string())
    })
}

/// Insert a leaf at a dotted path, materializing namespaces on the way.
/// A leaf in a namespace position is replaced by the namespace.
fn insert(root: &mut BTreeMap<String, Node>, segments: &[&str], sample: Dynamic) {
    match segments {
        [] => {}
        [leaf] => {
            root.insert((*leaf).to_string(), Node::Leaf(sample));
        }
        [head, rest @ ..] => {
            let entry = root
                .entry((*head).to_string())
                .or_insert_with(|| Node::Branch(BTreeMap::new()));
            if !matches!(entry, Node::Branch(_)) {
                *entry = Node::Branch(BTreeMap::new());
            }
            if let Node::Branch(children) = entry {
                insert(children, rest, sample);
            }
        }
    }
}

/// The declared-type family of a script result, or `None` when the result
/// is outside the supported set.
fn infer_type_name(value: &crate::codec::Value) -> Option<String> {
    use crate::codec::Value;
    match value {
        Value::Bool(_) => Some("bool".to_string()),
        Value::Int(_) | Value::UInt(_) => Some("int".to_string()),
        Value::Float(_) => Some("float".to_string()),
        Value::Text(_) => Some("string".to_string()),
        Value::Bytes(_) => None,
    }
}
