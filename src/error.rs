//! Custom error types for the telemetry core.
//!
//! This module defines the primary error type, `TelemetryError`, for the whole
//! crate. Using the `thiserror` crate, it provides a centralized and consistent
//! way to handle the failure modes of the data plane, from unresolvable
//! declared types to out-of-range conversions and misapplied analytics.
//!
//! Configuration-time violations are deliberately *not* reported one at a
//! time: the model layer collects every problem it finds and returns them
//! together as a single [`TelemetryError::InvalidConfig`], so a configuration
//! author sees all errors in one pass.

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type TelemetryResult<T> = std::result::Result<T, TelemetryError>;

#[derive(Error, Debug)]
pub enum TelemetryError {
    /// A declared data-type name that the codec does not recognize.
    #[error("unknown data type: {name}")]
    UnknownType { name: String },

    /// A value that is out of range or the wrong shape for the target type.
    /// Never silently clamps; carries both type names for diagnostics.
    #[error("cannot convert {value} ({from}) to {to}: out of range or wrong shape")]
    Conversion {
        value: String,
        from: &'static str,
        to: String,
    },

    /// An analytic invoked on a cache of the wrong canonical type.
    #[error("{op} requires a {expected} series, cache holds {actual}")]
    Type {
        op: &'static str,
        expected: &'static str,
        actual: &'static str,
    },

    /// Percentage change from a zero baseline to a nonzero value.
    #[error("cannot calculate percentage change from zero")]
    DivideByZero,

    /// A windowed "since" query found no point older than the window.
    #[error("no data point found before the specified time window")]
    NoBaseline,

    /// Flat bit addressing past the end of the newest byte value.
    #[error("bit index {index} out of range (limit {limit})")]
    IndexOutOfRange { index: usize, limit: usize },

    /// Per-byte bit index outside 0-7.
    #[error("bit index {index} out of range (must be 0-7)")]
    InvalidBitIndex { index: usize },

    /// Canonical-type-level operation attempted on an unsupported runtime type.
    #[error("unsupported type: {actual}")]
    UnsupportedType { actual: String },

    /// An unparsable window string in a query that has no permissive fallback.
    #[error("invalid time window format: {window}")]
    InvalidWindow { window: String },

    /// Ingestion write against a cache of a different canonical type.
    #[error("cache type mismatch for variable {key}")]
    CacheMismatch { key: String },

    /// Every configuration-time violation found during model construction,
    /// sorted, one message per problem.
    #[error("invalid model configuration:\n{}", .0.join("\n"))]
    InvalidConfig(Vec<String>),

    /// Expression compile or evaluation failure from the scripting adapter.
    #[error("script error: {0}")]
    Script(String),

    /// Malformed model JSON.
    #[error("model JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
