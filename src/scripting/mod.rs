//! Expression engine adapter for calculated variables.
//!
//! Calculated variables (script set, no connection) are evaluated by an
//! embedded Rhai engine against an environment that maps every variable
//! name to a handle over its series cache. Scripts call the documented
//! analytic surface directly:
//!
//! ```rhai
//! temperature.MA("30s") > 50.0 && status.Rising()
//! ```
//!
//! The adapter is deliberately thin: [`ExprEngine`] wraps engine
//! construction (bindings plus an operation budget so a runaway script
//! cannot stall a poll cycle), [`SeriesHandle`] bridges cache methods into
//! scripts, and [`validate_script`] dry-runs a script against type-derived
//! sample values before any real readings exist.
//!
//! Evaluation results come back as dynamic [`crate::codec::Value`]s and are
//! fed through the value codec like any controller reading.

pub mod bindings;
pub mod check;
pub mod engine;

pub use bindings::{register_series, SeriesHandle};
pub use check::validate_script;
pub use engine::ExprEngine;
