//! # Edge Telemetry Core
//!
//! This crate is the data plane of an edge-gateway telemetry layer. It
//! ingests readings for named variables (most sourced from industrial
//! controllers, some computed from scripts), keeps a bounded, time-expiring
//! history per variable, computes rolling analytics on that history,
//! detects meaningful change, and decides, per scheduler tick, which
//! variables must be published upstream.
//!
//! The crate performs no network I/O, protocol decoding, or persistence: it
//! is a pure in-memory model consumed by a surrounding poller and publisher.
//!
//! ## Crate Structure
//!
//! The library is organized into several modules, each with a distinct
//! responsibility:
//!
//! - **`codec`**: Resolves declared industrial type names (`Bool`, `Word`,
//!   `String[20]`, ...) onto the four canonical storage types and performs
//!   bounds-checked value conversion, including little-endian packing of the
//!   bit-addressable types.
//! - **`cache`**: The generic, concurrency-safe time-series cache with TTL
//!   eviction and windowed analytics (moving average, deviation, change,
//!   edges, bit addressing).
//! - **`variable`**: The `Variable` model: configuration surface, resolved
//!   canonical cache, and the ingestion write path with scale/offset.
//! - **`publish`**: Change detection against the last published point and
//!   the gcd-aligned publish scheduler with back-fill.
//! - **`model`**: The `DeviceModel`: JSON round-trip, aggregate
//!   configuration validation, identity hashing, expression environment and
//!   snapshot assembly.
//! - **`scripting`**: The Rhai expression-engine adapter for calculated
//!   variables and script validation.
//! - **`comm`**: Outbound message records for the publisher/transport layer.
//! - **`entity`**: Entity-level expression declarations consumed upstream.
//! - **`error`**: The crate-wide `TelemetryError` taxonomy.
//!
//! ## Concurrency Model
//!
//! Each variable's cache is an independent reader/writer-locked unit:
//! ingestion and analytics may run concurrently on the same cache from
//! different threads, and eviction runs under the write lock so readers
//! never observe partially evicted state. The publish scheduler mutates the
//! latest-published marker through `&mut Variable`, which pins scheduling
//! to one thread per variable by construction.

pub mod cache;
pub mod codec;
pub mod comm;
pub mod entity;
pub mod error;
pub mod model;
pub mod publish;
pub mod scripting;
pub mod variable;

pub use cache::{Point, SeriesCache, SeriesValue};
pub use codec::{to_bytes, to_f64, CanonicalKind, CanonicalValue, DataType, Value};
pub use comm::{Command, CommandResponse, EventSample, FieldSample, PushEvent, PushField};
pub use entity::EntityModel;
pub use error::{TelemetryError, TelemetryResult};
pub use model::DeviceModel;
pub use publish::PushValue;
pub use scripting::{validate_script, ExprEngine, SeriesHandle};
pub use variable::{SeriesSlot, Variable, DEFAULT_CACHE_DURATION};
