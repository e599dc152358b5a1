//! Series cache bindings for Rhai scripts.
//!
//! [`SeriesHandle`] wraps a variable's canonical cache slot and exposes the
//! analytic surface to scripts under the documented method names
//! (`Value`, `MA`, `StdDev`, `Rising`, `Bit`, ...). Cache-level errors
//! (wrong canonical type, zero baseline, out-of-range bit index) surface as
//! Rhai runtime errors, so a script evaluation fails the same way any other
//! analytic caller would.

use rhai::{Dynamic, Engine, EvalAltResult, Position};

use crate::error::TelemetryError;
use crate::variable::SeriesSlot;

/// Handle to one variable's series cache, usable from Rhai scripts.
///
/// Cheap to clone: the underlying cache is shared, so scripts observe the
/// same live history the poller ingests into.
#[derive(Debug, Clone)]
pub struct SeriesHandle {
    slot: SeriesSlot,
}

/// Forward one analytic call to whichever canonical cache the slot holds.
macro_rules! on_cache {
    ($handle:expr, $cache:ident => $body:expr) => {
        match &$handle.slot {
            SeriesSlot::Float($cache) => $body,
            SeriesSlot::Bool($cache) => $body,
            SeriesSlot::Text($cache) => $body,
            SeriesSlot::Bytes($cache) => $body,
        }
    };
}

impl SeriesHandle {
    /// Wrap a cache slot for script access.
    pub fn new(slot: SeriesSlot) -> Self {
        Self { slot }
    }

    /// Newest value as a script value; the type's empty value when the
    /// cache holds no points.
    fn value_dynamic(&self) -> Dynamic {
        match &self.slot {
            SeriesSlot::Float(cache) => Dynamic::from(cache.value()),
            SeriesSlot::Bool(cache) => Dynamic::from(cache.value()),
            SeriesSlot::Text(cache) => Dynamic::from(cache.value()),
            SeriesSlot::Bytes(cache) => Dynamic::from_blob(cache.value()),
        }
    }

    fn len(&self) -> i64 {
        on_cache!(self, cache => cache.len() as i64)
    }

    fn changed(&self) -> bool {
        on_cache!(self, cache => cache.changed())
    }

    fn count(&self, window: &str) -> i64 {
        on_cache!(self, cache => cache.count(window) as i64)
    }
}

fn runtime_error(err: TelemetryError) -> Box<EvalAltResult> {
    Box::new(EvalAltResult::ErrorRuntime(
        err.to_string().into(),
        Position::NONE,
    ))
}

fn index(value: i64, what: &str) -> Result<usize, Box<EvalAltResult>> {
    usize::try_from(value).map_err(|_| {
        Box::new(EvalAltResult::ErrorRuntime(
            format!("{what} index out of range").into(),
            Position::NONE,
        ))
    })
}

/// Register the `Series` type and its analytic surface with an engine.
pub fn register_series(engine: &mut Engine) {
    engine.register_type_with_name::<SeriesHandle>("Series");

    engine.register_fn("Value", |series: &mut SeriesHandle| series.value_dynamic());
    engine.register_fn("Latest", |series: &mut SeriesHandle| series.value_dynamic());
    engine.register_fn("Len", |series: &mut SeriesHandle| series.len());
    engine.register_fn("Changed", |series: &mut SeriesHandle| series.changed());
    engine.register_fn("Count", |series: &mut SeriesHandle, window: &str| {
        series.count(window)
    });

    engine.register_fn(
        "MA",
        |series: &mut SeriesHandle, window: &str| -> Result<f64, Box<EvalAltResult>> {
            on_cache!(series, cache => cache.ma(window)).map_err(runtime_error)
        },
    );
    engine.register_fn(
        "StdDev",
        |series: &mut SeriesHandle, window: &str| -> Result<f64, Box<EvalAltResult>> {
            on_cache!(series, cache => cache.std_dev(window)).map_err(runtime_error)
        },
    );
    engine.register_fn(
        "PctChange",
        |series: &mut SeriesHandle| -> Result<f64, Box<EvalAltResult>> {
            on_cache!(series, cache => cache.pct_change()).map_err(runtime_error)
        },
    );
    engine.register_fn(
        "Diff",
        |series: &mut SeriesHandle| -> Result<f64, Box<EvalAltResult>> {
            on_cache!(series, cache => cache.diff()).map_err(runtime_error)
        },
    );
    engine.register_fn(
        "PctChangeSince",
        |series: &mut SeriesHandle, window: &str| -> Result<f64, Box<EvalAltResult>> {
            on_cache!(series, cache => cache.pct_change_since(window)).map_err(runtime_error)
        },
    );
    engine.register_fn(
        "DiffSince",
        |series: &mut SeriesHandle, window: &str| -> Result<f64, Box<EvalAltResult>> {
            on_cache!(series, cache => cache.diff_since(window)).map_err(runtime_error)
        },
    );

    // Threshold comparisons accept both int and float literals.
    engine.register_fn(
        "PctChangeExceeds",
        |series: &mut SeriesHandle, threshold: f64| -> Result<bool, Box<EvalAltResult>> {
            on_cache!(series, cache => cache.pct_change_exceeds(threshold)).map_err(runtime_error)
        },
    );
    engine.register_fn(
        "PctChangeExceeds",
        |series: &mut SeriesHandle, threshold: i64| -> Result<bool, Box<EvalAltResult>> {
            on_cache!(series, cache => cache.pct_change_exceeds(threshold as f64))
                .map_err(runtime_error)
        },
    );
    engine.register_fn(
        "DiffExceeds",
        |series: &mut SeriesHandle, threshold: f64| -> Result<bool, Box<EvalAltResult>> {
            on_cache!(series, cache => cache.diff_exceeds(threshold)).map_err(runtime_error)
        },
    );
    engine.register_fn(
        "DiffExceeds",
        |series: &mut SeriesHandle, threshold: i64| -> Result<bool, Box<EvalAltResult>> {
            on_cache!(series, cache => cache.diff_exceeds(threshold as f64))
                .map_err(runtime_error)
        },
    );

    engine.register_fn(
        "Rising",
        |series: &mut SeriesHandle| -> Result<bool, Box<EvalAltResult>> {
            on_cache!(series, cache => cache.rising()).map_err(runtime_error)
        },
    );
    engine.register_fn(
        "Falling",
        |series: &mut SeriesHandle| -> Result<bool, Box<EvalAltResult>> {
            on_cache!(series, cache => cache.falling()).map_err(runtime_error)
        },
    );
    engine.register_fn(
        "RC",
        |series: &mut SeriesHandle, window: &str| -> Result<i64, Box<EvalAltResult>> {
            on_cache!(series, cache => cache.rising_count(window))
                .map(|count| count as i64)
                .map_err(runtime_error)
        },
    );
    engine.register_fn(
        "FC",
        |series: &mut SeriesHandle, window: &str| -> Result<i64, Box<EvalAltResult>> {
            on_cache!(series, cache => cache.falling_count(window))
                .map(|count| count as i64)
                .map_err(runtime_error)
        },
    );

    engine.register_fn(
        "Bit",
        |series: &mut SeriesHandle, bit: i64| -> Result<bool, Box<EvalAltResult>> {
            let bit = index(bit, "bit")?;
            on_cache!(series, cache => cache.bit(bit)).map_err(runtime_error)
        },
    );
    engine.register_fn(
        "ByteBit",
        |series: &mut SeriesHandle, byte: i64, bit: i64| -> Result<bool, Box<EvalAltResult>> {
            let byte = index(byte, "byte")?;
            let bit = index(bit, "bit")?;
            on_cache!(series, cache => cache.byte_bit(byte, bit)).map_err(runtime_error)
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SeriesCache;
    use crate::scripting::ExprEngine;
    use chrono::Utc;
    use rhai::Scope;
    use std::sync::Arc;
    use std::time::Duration;

    fn seconds_ago(s: i64) -> chrono::DateTime<Utc> {
        Utc::now() - chrono::Duration::seconds(s)
    }

    fn test_scope() -> Scope<'static> {
        let temperature = Arc::new(SeriesCache::<f64>::new(Duration::from_secs(600)));
        temperature.add_point(10.0, Some(seconds_ago(20)));
        temperature.add_point(30.0, Some(seconds_ago(10)));

        let status = Arc::new(SeriesCache::<bool>::new(Duration::from_secs(600)));
        status.add_point(false, Some(seconds_ago(20)));
        status.add_point(true, Some(seconds_ago(10)));

        let message = Arc::new(SeriesCache::<String>::new(Duration::from_secs(600)));
        message.add_point("ready".to_string(), Some(seconds_ago(10)));

        let data = Arc::new(SeriesCache::<Vec<u8>>::new(Duration::from_secs(600)));
        data.add_point(vec![0x00, 0x10], Some(seconds_ago(10)));

        let mut scope = Scope::new();
        scope.push("temperature", SeriesHandle::new(SeriesSlot::Float(temperature)));
        scope.push("status", SeriesHandle::new(SeriesSlot::Bool(status)));
        scope.push("message", SeriesHandle::new(SeriesSlot::Text(message)));
        scope.push("data", SeriesHandle::new(SeriesSlot::Bytes(data)));
        scope
    }

    fn eval(script: &str) -> crate::codec::Value {
        let engine = ExprEngine::new();
        let ast = engine.compile(script).unwrap();
        engine.eval(&ast, &mut test_scope()).unwrap()
    }

    #[test]
    fn scripts_read_values_and_lengths() {
        assert_eq!(eval("temperature.Value() * 0.5"), crate::codec::Value::Float(15.0));
        assert_eq!(eval("temperature.Len()"), crate::codec::Value::Int(2));
        assert_eq!(
            eval(r#"message.Value() + " to go""#),
            crate::codec::Value::Text("ready to go".to_string())
        );
    }

    #[test]
    fn scripts_run_windowed_analytics() {
        assert_eq!(
            eval(r#"temperature.MA("60s")"#),
            crate::codec::Value::Float(20.0)
        );
        assert_eq!(eval("temperature.Diff()"), crate::codec::Value::Float(20.0));
        assert_eq!(eval("temperature.PctChange()"), crate::codec::Value::Float(200.0));
        assert_eq!(
            eval(r#"temperature.Count("60s")"#),
            crate::codec::Value::Int(2)
        );
    }

    #[test]
    fn threshold_comparisons_accept_int_and_float() {
        assert_eq!(eval("temperature.DiffExceeds(10)"), crate::codec::Value::Bool(true));
        assert_eq!(
            eval("temperature.DiffExceeds(25.0)"),
            crate::codec::Value::Bool(false)
        );
    }

    #[test]
    fn scripts_observe_boolean_edges() {
        assert_eq!(eval("status.Rising()"), crate::codec::Value::Bool(true));
        assert_eq!(eval("status.Falling()"), crate::codec::Value::Bool(false));
        assert_eq!(eval(r#"status.RC("60s")"#), crate::codec::Value::Int(1));
        assert_eq!(eval("status.Changed()"), crate::codec::Value::Bool(true));
    }

    #[test]
    fn scripts_address_bits() {
        assert_eq!(eval("data.Bit(12)"), crate::codec::Value::Bool(true));
        assert_eq!(eval("data.ByteBit(1, 4)"), crate::codec::Value::Bool(true));
        assert_eq!(eval("data.ByteBit(0, 4)"), crate::codec::Value::Bool(false));
    }

    #[test]
    fn type_errors_surface_as_script_errors() {
        let engine = ExprEngine::new();
        let ast = engine.compile(r#"message.MA("10s")"#).unwrap();
        let err = engine.eval(&ast, &mut test_scope()).unwrap_err();
        assert!(err.to_string().contains("float64"));

        let ast = engine.compile("data.Bit(100)").unwrap();
        let err = engine.eval(&ast, &mut test_scope()).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }
}
