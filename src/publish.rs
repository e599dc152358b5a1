//! Change detection and publish scheduling.
//!
//! One shared ticking loop serves many independently-cycled variables: the
//! caller computes the greatest common divisor of all configured publish
//! cycles and calls [`Variable::push_values`] for each variable on every
//! gcd tick. A variable emits when its own cycle boundary aligns with the
//! tick, or, for a zero cycle, whenever its value meaningfully changed
//! since the last publish.
//!
//! "Meaningfully changed" is decided against the latest *published* point,
//! not the previous cached point: the absolute threshold wins when both
//! thresholds are configured, the percentage threshold applies next (with a
//! zero baseline counting as an infinite step unless the new value is also
//! zero), and exact inequality is the fallback. Non-numeric canonical types
//! always compare exactly.
//!
//! The latest-published marker is owned by the scheduler: only
//! [`Variable::push_values`] mutates it, through `&mut self`, which keeps
//! the marker race-free as long as each variable is ticked from one
//! scheduling thread, the discipline the surrounding poller already has.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::trace;

use crate::cache::{SeriesCache, SeriesValue};
use crate::codec::CanonicalValue;
use crate::variable::{SeriesSlot, Variable};

/// One value destined for the publish sink.
///
/// Produced fresh each scheduler tick; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushValue {
    pub value: CanonicalValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Variable {
    /// Whether the cached value differs meaningfully from the last value
    /// actually published.
    ///
    /// False without a cache; true when nothing has ever been published.
    pub fn changed_since_last_publish(&self) -> bool {
        let Some(slot) = self.series() else {
            return false;
        };
        let Some((last_value, _)) = self.latest_push.as_ref() else {
            return true;
        };
        match (slot, last_value) {
            (SeriesSlot::Float(cache), CanonicalValue::Float(last)) => {
                let current = cache.value();
                if let Some(threshold) = self.diff_threshold {
                    return (current - last).abs() >= threshold;
                }
                if let Some(threshold) = self.pct_threshold {
                    let pct = if *last == 0.0 {
                        if current == 0.0 {
                            0.0
                        } else {
                            f64::MAX
                        }
                    } else {
                        ((current - last) / last) * 100.0
                    };
                    return pct.abs() >= threshold;
                }
                current != *last
            }
            (SeriesSlot::Bool(cache), CanonicalValue::Bool(last)) => cache.value() != *last,
            (SeriesSlot::Text(cache), CanonicalValue::Text(last)) => cache.value() != *last,
            (SeriesSlot::Bytes(cache), CanonicalValue::Bytes(last)) => cache.value() != *last,
            // A marker of the wrong kind cannot be compared; treat as changed.
            _ => true,
        }
    }

    /// The push values this variable owes for the given scheduler tick.
    ///
    /// `gcd_tick` is the greatest common divisor of all variables' publish
    /// cycles and `tick_index` counts gcd ticks. A variable emits when
    /// `tick_index` lands on its own cycle boundary, or, with a zero
    /// publish cycle, whenever it changed since the last publish. No
    /// publish cycle, no cache, or an empty cache yields nothing.
    ///
    /// When the value changed since the last publish and the cache holds an
    /// intermediate point the previous cycle skipped, that point is emitted
    /// first as a back-fill so the transition is not lost, then the newest
    /// point. Every emission moves the latest-published marker to the
    /// newest point.
    pub fn push_values(&mut self, gcd_tick: Duration, tick_index: i64) -> Vec<PushValue> {
        let mut out = Vec::new();
        let Some(cycle) = self.publish_cycle else {
            return out;
        };
        if self.series().is_none() {
            return out;
        }
        let times = if gcd_tick.is_zero() {
            0
        } else {
            (cycle.as_nanos() / gcd_tick.as_nanos()) as i64
        };
        let changed = self.changed_since_last_publish();
        let due = (cycle.is_zero() && changed) || (times != 0 && tick_index % times == 0);
        if !due {
            return out;
        }
        trace!(key = %self.key, tick_index, changed, "emitting push values");

        // The borrow of the slot ends before the marker update below.
        let emitted = match self.series().cloned() {
            Some(SeriesSlot::Float(cache)) => {
                emit_series(&cache, &self.latest_push, changed, &mut out)
            }
            Some(SeriesSlot::Bool(cache)) => {
                emit_series(&cache, &self.latest_push, changed, &mut out)
            }
            Some(SeriesSlot::Text(cache)) => {
                emit_series(&cache, &self.latest_push, changed, &mut out)
            }
            Some(SeriesSlot::Bytes(cache)) => {
                emit_series(&cache, &self.latest_push, changed, &mut out)
            }
            None => None,
        };
        if let Some(marker) = emitted {
            self.latest_push = Some(marker);
        }
        out
    }
}

/// Emit the due points of one cache and return the new marker position.
///
/// The newest point is always emitted. A back-fill of the second-newest
/// point precedes it when the value changed, a previous publish exists, and
/// that previous publish was not the second-newest point itself.
fn emit_series<T: SeriesValue>(
    cache: &SeriesCache<T>,
    marker: &Option<(CanonicalValue, DateTime<Utc>)>,
    changed: bool,
    out: &mut Vec<PushValue>,
) -> Option<(CanonicalValue, DateTime<Utc>)> {
    let newest = cache.point()?;
    if changed {
        if let (Some(previous), Some((_, marker_ts))) = (cache.prev_point(), marker.as_ref()) {
            if previous.timestamp != *marker_ts {
                out.push(PushValue {
                    value: previous.value.into_canonical(),
                    timestamp: Some(previous.timestamp),
                });
            }
        }
    }
    let canonical = newest.value.into_canonical();
    out.push(PushValue {
        value: canonical.clone(),
        timestamp: Some(newest.timestamp),
    });
    Some((canonical, newest.timestamp))
}
