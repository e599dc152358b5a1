//! Rhai engine wrapper for expression compilation and evaluation.

use rhai::{Dynamic, Engine, ImmutableString, Scope, AST};

use crate::codec::Value;
use crate::error::{TelemetryError, TelemetryResult};
use crate::scripting::bindings;

/// Operation budget per evaluation. Expressions here are short analytics
/// over cache handles; anything that runs longer is a runaway script.
const MAX_OPERATIONS: u64 = 10_000;

/// An expression engine with the series bindings registered.
///
/// One engine can compile and evaluate any number of scripts; compiled
/// programs ([`AST`]s) are interchangeable between engines constructed
/// here.
pub struct ExprEngine {
    engine: Engine,
}

impl ExprEngine {
    /// Create an engine with series bindings and the operation budget.
    pub fn new() -> Self {
        let mut engine = Engine::new();

        engine.on_progress(|count| {
            if count > MAX_OPERATIONS {
                Some(format!("operation budget exceeded: maximum {MAX_OPERATIONS}").into())
            } else {
                None
            }
        });

        bindings::register_series(&mut engine);

        Self { engine }
    }

    /// Compile a script without executing it.
    ///
    /// # Errors
    ///
    /// [`TelemetryError::Script`] for syntax errors.
    pub fn compile(&self, script: &str) -> TelemetryResult<AST> {
        self.engine
            .compile(script)
            .map_err(|err| TelemetryError::Script(err.to_string()))
    }

    /// Evaluate a compiled script against a scope of series handles and
    /// return the dynamically typed result.
    ///
    /// # Errors
    ///
    /// [`TelemetryError::Script`] for runtime failures (including cache
    /// analytic errors surfaced by the bindings) and for result types
    /// outside the supported set.
    pub fn eval(&self, ast: &AST, scope: &mut Scope) -> TelemetryResult<Value> {
        let result = self
            .engine
            .eval_ast_with_scope::<Dynamic>(scope, ast)
            .map_err(|err| TelemetryError::Script(err.to_string()))?;
        dynamic_to_value(result)
    }
}

impl Default for ExprEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Map a Rhai result into the codec's dynamic value set.
pub(crate) fn dynamic_to_value(value: Dynamic) -> TelemetryResult<Value> {
    let type_name = value.type_name();
    if let Some(b) = value.clone().try_cast::<bool>() {
        return Ok(Value::Bool(b));
    }
    if let Some(i) = value.clone().try_cast::<i64>() {
        return Ok(Value::Int(i));
    }
    if let Some(f) = value.clone().try_cast::<f64>() {
        return Ok(Value::Float(f));
    }
    if let Some(s) = value.clone().try_cast::<ImmutableString>() {
        return Ok(Value::Text(s.to_string()));
    }
    if let Some(b) = value.try_cast::<rhai::Blob>() {
        return Ok(Value::Bytes(b));
    }
    Err(TelemetryError::Script(format!(
        "unsupported result type: {type_name}"
    )))
}

/// Map a dynamic value into a Rhai scope value.
pub(crate) fn value_to_dynamic(value: &Value) -> Dynamic {
    match value {
        Value::Bool(b) => Dynamic::from(*b),
        Value::Int(i) => Dynamic::from(*i),
        // Rhai has no unsigned integer; values past i64 degrade to float.
        Value::UInt(u) => i64::try_from(*u)
            .map(Dynamic::from)
            .unwrap_or_else(|_| Dynamic::from(*u as f64)),
        Value::Float(f) => Dynamic::from(*f),
        Value::Text(s) => Dynamic::from(s.clone()),
        Value::Bytes(b) => Dynamic::from_blob(b.clone()),
    }
}
