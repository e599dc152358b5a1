//! Bounded, time-expiring value history with windowed analytics.
//!
//! Every variable owns one [`SeriesCache`] of its canonical type. The cache
//! is an ordered sequence of [`Point`]s (insertion order, which is also
//! chronological order under normal use) guarded by a reader/writer lock, so
//! one poller thread can ingest while analytics readers run concurrently.
//! Each cache is an independent unit of mutual exclusion; there is no
//! cross-cache locking.
//!
//! Two invariants hold after every mutation:
//!
//! - no two points share a timestamp: inserting at an existing timestamp
//!   overwrites that point's value in place instead of appending;
//! - no point is older than the expiry duration (expiry zero disables
//!   eviction entirely).
//!
//! Windowed analytics accept a trailing-duration string ("30s", "5m"). An
//! unparsable window falls back to "all points", a deliberate permissive
//! choice, documented and pinned by tests, not a bug. The `*_since` queries
//! are the exception: they reject unparsable windows, because their baseline
//! lookup is meaningless without one.

use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::trace;

use crate::codec::{CanonicalKind, CanonicalValue};
use crate::error::{TelemetryError, TelemetryResult};

/// One observation in a series: a value and the instant it was taken.
///
/// Stored points always carry a timestamp; [`SeriesCache::add_point`] fills
/// in "now" when the caller has none.
#[derive(Debug, Clone, PartialEq)]
pub struct Point<T> {
    pub value: T,
    pub timestamp: DateTime<Utc>,
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for f64 {}
    impl Sealed for bool {}
    impl Sealed for String {}
    impl Sealed for Vec<u8> {}
}

/// A value type a [`SeriesCache`] can hold.
///
/// Sealed to exactly the four canonical storage types. The kind tag and the
/// typed views give the generic analytics their runtime type guards, so a
/// float-only analytic on a text cache fails with a type error instead of
/// producing garbage.
pub trait SeriesValue:
    Clone + PartialEq + std::fmt::Debug + Default + Send + Sync + sealed::Sealed + 'static
{
    /// The canonical kind of this storage type.
    const KIND: CanonicalKind;

    /// Move this value into its canonical wire form.
    fn into_canonical(self) -> CanonicalValue;

    fn as_f64(&self) -> Option<f64> {
        None
    }

    fn as_bool(&self) -> Option<bool> {
        None
    }

    fn as_bytes(&self) -> Option<&[u8]> {
        None
    }
}

impl SeriesValue for f64 {
    const KIND: CanonicalKind = CanonicalKind::Float;

    fn into_canonical(self) -> CanonicalValue {
        CanonicalValue::Float(self)
    }

    fn as_f64(&self) -> Option<f64> {
        Some(*self)
    }
}

impl SeriesValue for bool {
    const KIND: CanonicalKind = CanonicalKind::Bool;

    fn into_canonical(self) -> CanonicalValue {
        CanonicalValue::Bool(self)
    }

    fn as_bool(&self) -> Option<bool> {
        Some(*self)
    }
}

impl SeriesValue for String {
    const KIND: CanonicalKind = CanonicalKind::Text;

    fn into_canonical(self) -> CanonicalValue {
        CanonicalValue::Text(self)
    }
}

impl SeriesValue for Vec<u8> {
    const KIND: CanonicalKind = CanonicalKind::Bytes;

    fn into_canonical(self) -> CanonicalValue {
        CanonicalValue::Bytes(self)
    }

    fn as_bytes(&self) -> Option<&[u8]> {
        Some(self)
    }
}

/// Concurrency-safe ordered store of timestamped values with TTL eviction.
///
/// Safe for many concurrent readers and one concurrent writer; eviction runs
/// under the same write lock as insertion, so readers never observe a
/// partially evicted sequence.
#[derive(Debug)]
pub struct SeriesCache<T: SeriesValue> {
    points: RwLock<Vec<Point<T>>>,
    expiry: Duration,
}

impl<T: SeriesValue> SeriesCache<T> {
    /// Create an empty cache whose points expire after `expiry`.
    ///
    /// A zero expiry disables eviction.
    pub fn new(expiry: Duration) -> Self {
        Self {
            points: RwLock::new(Vec::new()),
            expiry,
        }
    }

    /// The configured expiry duration.
    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    /// Insert a reading, defaulting the timestamp to now.
    ///
    /// If a point with an equal timestamp already exists its value is
    /// replaced in place; otherwise the point is appended. Expired points
    /// are evicted afterwards, under the same write lock.
    pub fn add_point(&self, value: T, timestamp: Option<DateTime<Utc>>) {
        let timestamp = timestamp.unwrap_or_else(Utc::now);
        let mut points = self.points.write();
        if let Some(existing) = points.iter_mut().find(|p| p.timestamp == timestamp) {
            trace!(%timestamp, "replacing point at existing timestamp");
            existing.value = value;
        } else {
            points.push(Point { value, timestamp });
        }
        self.evict_expired(&mut points);
    }

    /// Drop points older than the expiry horizon. Caller holds the write lock.
    fn evict_expired(&self, points: &mut Vec<Point<T>>) {
        if self.expiry.is_zero() {
            return;
        }
        let Ok(expiry) = chrono::Duration::from_std(self.expiry) else {
            return;
        };
        let cutoff = Utc::now() - expiry;
        let before = points.len();
        points.retain(|p| p.timestamp >= cutoff);
        if points.len() < before {
            trace!(evicted = before - points.len(), "evicted expired points");
        }
    }

    /// Newest value, or the type's empty value when the cache is empty.
    pub fn value(&self) -> T {
        self.latest().unwrap_or_default()
    }

    /// Newest value, if any.
    pub fn latest(&self) -> Option<T> {
        self.points.read().last().map(|p| p.value.clone())
    }

    /// Newest timestamp, if any.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.points.read().last().map(|p| p.timestamp)
    }

    /// A copy of the newest point, if any.
    pub fn point(&self) -> Option<Point<T>> {
        self.points.read().last().cloned()
    }

    /// A copy of the second-newest point, if any.
    pub fn prev_point(&self) -> Option<Point<T>> {
        let points = self.points.read();
        points.len().checked_sub(2).map(|i| points[i].clone())
    }

    /// Current point count.
    pub fn len(&self) -> usize {
        self.points.read().len()
    }

    /// True when the cache holds no points.
    pub fn is_empty(&self) -> bool {
        self.points.read().is_empty()
    }

    /// Points whose timestamp falls within the trailing window, in original
    /// order. An unparsable window returns all points (permissive fallback).
    pub fn points_in_window(&self, window: &str) -> Vec<Point<T>> {
        let points = self.points.read();
        if points.is_empty() {
            return Vec::new();
        }
        let Some(cutoff) = window_cutoff(window) else {
            trace!(window, "unparsable window, returning all points");
            return points.clone();
        };
        points
            .iter()
            .filter(|p| p.timestamp > cutoff)
            .cloned()
            .collect()
    }

    /// Mean of the values within the window.
    ///
    /// An empty window yields 0.
    ///
    /// # Errors
    ///
    /// [`TelemetryError::Type`] unless the cache holds floats.
    pub fn ma(&self, window: &str) -> TelemetryResult<f64> {
        let points = self.points_in_window(window);
        if points.is_empty() {
            return Ok(0.0);
        }
        require_float::<T>("MA")?;
        let sum: f64 = points.iter().map(|p| p.value.as_f64().unwrap_or(0.0)).sum();
        Ok(sum / points.len() as f64)
    }

    /// Population standard deviation of the values within the window.
    ///
    /// An empty window yields 0; so does a single point.
    ///
    /// # Errors
    ///
    /// [`TelemetryError::Type`] unless the cache holds floats.
    pub fn std_dev(&self, window: &str) -> TelemetryResult<f64> {
        let points = self.points_in_window(window);
        if points.is_empty() {
            return Ok(0.0);
        }
        require_float::<T>("StdDev")?;
        if points.len() == 1 {
            return Ok(0.0);
        }
        let values: Vec<f64> = points
            .iter()
            .map(|p| p.value.as_f64().unwrap_or(0.0))
            .collect();
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let variance = values
            .iter()
            .map(|v| {
                let diff = v - mean;
                diff * diff
            })
            .sum::<f64>()
            / values.len() as f64;
        Ok(variance.sqrt())
    }

    /// Percentage change between the two newest points.
    ///
    /// Fewer than two points yields 0. A 0 -> 0 step yields 0.
    ///
    /// # Errors
    ///
    /// [`TelemetryError::Type`] unless the cache holds floats;
    /// [`TelemetryError::DivideByZero`] when the older value is exactly 0
    /// and the newer is not.
    pub fn pct_change(&self) -> TelemetryResult<f64> {
        let points = self.points.read();
        if points.len() < 2 {
            return Ok(0.0);
        }
        require_float::<T>("PctChange")?;
        let current = points[points.len() - 1].value.as_f64().unwrap_or(0.0);
        let previous = points[points.len() - 2].value.as_f64().unwrap_or(0.0);
        pct_between(previous, current)
    }

    /// Absolute change between the two newest points (current - previous).
    ///
    /// Fewer than two points yields 0.
    ///
    /// # Errors
    ///
    /// [`TelemetryError::Type`] unless the cache holds floats.
    pub fn diff(&self) -> TelemetryResult<f64> {
        let points = self.points.read();
        if points.len() < 2 {
            return Ok(0.0);
        }
        require_float::<T>("Diff")?;
        let current = points[points.len() - 1].value.as_f64().unwrap_or(0.0);
        let previous = points[points.len() - 2].value.as_f64().unwrap_or(0.0);
        Ok(current - previous)
    }

    /// Whether the magnitude of [`Self::pct_change`] strictly exceeds
    /// `threshold`.
    pub fn pct_change_exceeds(&self, threshold: f64) -> TelemetryResult<bool> {
        Ok(self.pct_change()?.abs() > threshold)
    }

    /// Whether the magnitude of [`Self::diff`] strictly exceeds `threshold`.
    pub fn diff_exceeds(&self, threshold: f64) -> TelemetryResult<bool> {
        Ok(self.diff()?.abs() > threshold)
    }

    /// Whether the two newest values differ. Fewer than two points is "no".
    pub fn changed(&self) -> bool {
        let points = self.points.read();
        if points.len() < 2 {
            return false;
        }
        points[points.len() - 1].value != points[points.len() - 2].value
    }

    /// Percentage change between the newest value and the most recent value
    /// strictly older than the window.
    ///
    /// An empty cache yields 0.
    ///
    /// # Errors
    ///
    /// [`TelemetryError::Type`] unless the cache holds floats;
    /// [`TelemetryError::InvalidWindow`] for an unparsable window;
    /// [`TelemetryError::NoBaseline`] when no point predates the window;
    /// [`TelemetryError::DivideByZero`] for a zero baseline and nonzero
    /// current value.
    pub fn pct_change_since(&self, window: &str) -> TelemetryResult<f64> {
        let (baseline, current) = match self.since_pair(window, "PctChangeSince")? {
            Some(pair) => pair,
            None => return Ok(0.0),
        };
        pct_between(baseline, current)
    }

    /// Absolute change between the newest value and the most recent value
    /// strictly older than the window.
    ///
    /// Shares [`Self::pct_change_since`]'s error cases apart from the zero
    /// baseline rule.
    pub fn diff_since(&self, window: &str) -> TelemetryResult<f64> {
        let (baseline, current) = match self.since_pair(window, "DiffSince")? {
            Some(pair) => pair,
            None => return Ok(0.0),
        };
        Ok(current - baseline)
    }

    /// Baseline and current float values for the `*_since` analytics.
    /// `None` means the cache is empty (callers report 0).
    fn since_pair(&self, window: &str, op: &'static str) -> TelemetryResult<Option<(f64, f64)>> {
        let points = self.points.read();
        let Some(newest) = points.last() else {
            return Ok(None);
        };
        require_float::<T>(op)?;
        let current = newest.value.as_f64().unwrap_or(0.0);
        let duration =
            humantime::parse_duration(window).map_err(|_| TelemetryError::InvalidWindow {
                window: window.to_string(),
            })?;
        let expiry = chrono::Duration::from_std(duration).map_err(|_| {
            TelemetryError::InvalidWindow {
                window: window.to_string(),
            }
        })?;
        let target = Utc::now() - expiry;
        let baseline = points
            .iter()
            .rev()
            .find(|p| p.timestamp < target)
            .ok_or(TelemetryError::NoBaseline)?;
        Ok(Some((baseline.value.as_f64().unwrap_or(0.0), current)))
    }

    /// Number of value changes within the window: the first point counts as
    /// one change, and each point differing from its immediate predecessor
    /// counts as another (run-length transitions, not distinct values).
    pub fn count(&self, window: &str) -> usize {
        let points = self.points_in_window(window);
        if points.len() <= 1 {
            return points.len();
        }
        1 + points
            .windows(2)
            .filter(|pair| pair[0].value != pair[1].value)
            .count()
    }

    /// Whether the newest point is a false -> true edge.
    ///
    /// Fewer than two points yields false.
    ///
    /// # Errors
    ///
    /// [`TelemetryError::Type`] unless the cache holds booleans.
    pub fn rising(&self) -> TelemetryResult<bool> {
        let points = self.points.read();
        if points.len() < 2 {
            return Ok(false);
        }
        require_bool::<T>("Rising")?;
        let newest = points[points.len() - 1].value.as_bool().unwrap_or(false);
        let previous = points[points.len() - 2].value.as_bool().unwrap_or(false);
        Ok(newest && !previous)
    }

    /// Whether the newest point is a true -> false edge.
    ///
    /// Fewer than two points yields false.
    ///
    /// # Errors
    ///
    /// [`TelemetryError::Type`] unless the cache holds booleans.
    pub fn falling(&self) -> TelemetryResult<bool> {
        let points = self.points.read();
        if points.len() < 2 {
            return Ok(false);
        }
        require_bool::<T>("Falling")?;
        let newest = points[points.len() - 1].value.as_bool().unwrap_or(false);
        let previous = points[points.len() - 2].value.as_bool().unwrap_or(false);
        Ok(!newest && previous)
    }

    /// Count of false -> true transitions between adjacent points in the
    /// window.
    ///
    /// # Errors
    ///
    /// [`TelemetryError::Type`] unless the cache holds booleans.
    pub fn rising_count(&self, window: &str) -> TelemetryResult<usize> {
        self.edge_count(window, "RC", |prev, curr| !prev && curr)
    }

    /// Count of true -> false transitions between adjacent points in the
    /// window.
    ///
    /// # Errors
    ///
    /// [`TelemetryError::Type`] unless the cache holds booleans.
    pub fn falling_count(&self, window: &str) -> TelemetryResult<usize> {
        self.edge_count(window, "FC", |prev, curr| prev && !curr)
    }

    fn edge_count(
        &self,
        window: &str,
        op: &'static str,
        is_edge: fn(bool, bool) -> bool,
    ) -> TelemetryResult<usize> {
        let points = self.points_in_window(window);
        if points.len() < 2 {
            return Ok(0);
        }
        require_bool::<T>(op)?;
        Ok(points
            .windows(2)
            .filter(|pair| {
                is_edge(
                    pair[0].value.as_bool().unwrap_or(false),
                    pair[1].value.as_bool().unwrap_or(false),
                )
            })
            .count())
    }

    /// The bit at `index` of the newest byte value, treating the whole value
    /// as a flat little-endian bit array.
    ///
    /// An empty cache yields false.
    ///
    /// # Errors
    ///
    /// [`TelemetryError::Type`] unless the cache holds bytes;
    /// [`TelemetryError::IndexOutOfRange`] past the end of the value.
    pub fn bit(&self, index: usize) -> TelemetryResult<bool> {
        let points = self.points.read();
        let Some(newest) = points.last() else {
            return Ok(false);
        };
        let bytes = newest
            .value
            .as_bytes()
            .ok_or_else(|| type_error::<T>("Bit", "bytes"))?;
        let limit = bytes.len() * 8;
        if index >= limit {
            return Err(TelemetryError::IndexOutOfRange { index, limit });
        }
        Ok(bytes[index / 8] & (1 << (index % 8)) != 0)
    }

    /// Bit `bit_index` (0-7) of byte `byte_index` (0-based) of the newest
    /// byte value.
    ///
    /// An empty cache yields false.
    ///
    /// # Errors
    ///
    /// [`TelemetryError::Type`] unless the cache holds bytes;
    /// [`TelemetryError::IndexOutOfRange`] / [`TelemetryError::InvalidBitIndex`]
    /// for out-of-bounds addressing.
    pub fn byte_bit(&self, byte_index: usize, bit_index: usize) -> TelemetryResult<bool> {
        let points = self.points.read();
        let Some(newest) = points.last() else {
            return Ok(false);
        };
        let bytes = newest
            .value
            .as_bytes()
            .ok_or_else(|| type_error::<T>("ByteBit", "bytes"))?;
        if byte_index >= bytes.len() {
            return Err(TelemetryError::IndexOutOfRange {
                index: byte_index,
                limit: bytes.len(),
            });
        }
        if bit_index > 7 {
            return Err(TelemetryError::InvalidBitIndex { index: bit_index });
        }
        Ok(bytes[byte_index] & (1 << bit_index) != 0)
    }
}

/// The trailing-window cutoff instant, or `None` for an unparsable window.
fn window_cutoff(window: &str) -> Option<DateTime<Utc>> {
    let duration = humantime::parse_duration(window).ok()?;
    let duration = chrono::Duration::from_std(duration).ok()?;
    Some(Utc::now() - duration)
}

/// Percentage step from `previous` to `current` with the zero-baseline rule.
fn pct_between(previous: f64, current: f64) -> TelemetryResult<f64> {
    if previous == 0.0 {
        if current == 0.0 {
            return Ok(0.0);
        }
        return Err(TelemetryError::DivideByZero);
    }
    Ok(((current - previous) / previous) * 100.0)
}

fn require_float<T: SeriesValue>(op: &'static str) -> TelemetryResult<()> {
    if T::KIND != CanonicalKind::Float {
        return Err(type_error::<T>(op, "float64"));
    }
    Ok(())
}

fn require_bool<T: SeriesValue>(op: &'static str) -> TelemetryResult<()> {
    if T::KIND != CanonicalKind::Bool {
        return Err(type_error::<T>(op, "bool"));
    }
    Ok(())
}

fn type_error<T: SeriesValue>(op: &'static str, expected: &'static str) -> TelemetryError {
    TelemetryError::Type {
        op,
        expected,
        actual: T::KIND.name(),
    }
}
