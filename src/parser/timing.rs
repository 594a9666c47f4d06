//! Time units used across the trace model.
//!
//! Trace timestamps are integer microseconds on the trace clock. Values that
//! arrive as fractional numbers (some exporters write `ts: 1234.5`) are
//! rounded to the nearest microsecond on load so that arithmetic on them is
//! exact. Milliseconds are only used at the edges (EventTiming durations,
//! Server-Timing headers, configuration).

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

/// A point or span on the trace clock, in whole microseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct MicroSeconds(pub i64);

impl MicroSeconds {
    pub const ZERO: MicroSeconds = MicroSeconds(0);

    /// Round a fractional microsecond value onto the fixed grid
    pub fn from_f64(value: f64) -> Self {
        Self(value.round() as i64)
    }

    pub fn value(self) -> i64 {
        self.0
    }

    pub fn to_millis(self) -> MilliSeconds {
        MilliSeconds(self.0 as f64 / 1000.0)
    }

    /// Difference clamped at zero, for durations built from two timestamps
    pub fn saturating_span(self, earlier: MicroSeconds) -> MicroSeconds {
        Self((self.0 - earlier.0).max(0))
    }
}

impl<'de> Deserialize<'de> for MicroSeconds {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Ok(Self::from_f64(value))
    }
}

impl Add for MicroSeconds {
    type Output = MicroSeconds;

    fn add(self, rhs: MicroSeconds) -> MicroSeconds {
        MicroSeconds(self.0 + rhs.0)
    }
}

impl Sub for MicroSeconds {
    type Output = MicroSeconds;

    fn sub(self, rhs: MicroSeconds) -> MicroSeconds {
        MicroSeconds(self.0 - rhs.0)
    }
}

impl fmt::Display for MicroSeconds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}μs", self.0)
    }
}

/// Milliseconds, as used by web-facing APIs
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct MilliSeconds(pub f64);

impl MilliSeconds {
    pub fn value(self) -> f64 {
        self.0
    }

    pub fn to_micro(self) -> MicroSeconds {
        MicroSeconds::from_f64(self.0 * 1000.0)
    }
}

impl fmt::Display for MilliSeconds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}ms", self.0)
    }
}

/// Inclusive time window with its precomputed range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceWindow {
    pub min: MicroSeconds,
    pub max: MicroSeconds,
    pub range: MicroSeconds,
}

impl TraceWindow {
    pub fn new(min: MicroSeconds, max: MicroSeconds) -> Self {
        Self {
            min,
            max,
            range: max.saturating_span(min),
        }
    }

    /// True when `other` lies entirely within this window
    pub fn contains_window(&self, other: &TraceWindow) -> bool {
        other.min >= self.min && other.max <= self.max
    }

    pub fn contains(&self, ts: MicroSeconds) -> bool {
        ts >= self.min && ts <= self.max
    }
}

impl Default for TraceWindow {
    fn default() -> Self {
        Self::new(MicroSeconds::ZERO, MicroSeconds::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fractional_timestamps_round() {
        let ts: MicroSeconds = serde_json::from_str("1234.6").unwrap();
        assert_eq!(ts, MicroSeconds(1235));

        let ts: MicroSeconds = serde_json::from_str("98765").unwrap();
        assert_eq!(ts, MicroSeconds(98765));
    }

    #[test]
    fn test_millis_conversion() {
        assert_eq!(MilliSeconds(1.5).to_micro(), MicroSeconds(1500));
        assert_eq!(MicroSeconds(2500).to_millis(), MilliSeconds(2.5));
    }

    #[test]
    fn test_window_containment() {
        let outer = TraceWindow::new(MicroSeconds(0), MicroSeconds(100));
        let inner = TraceWindow::new(MicroSeconds(10), MicroSeconds(90));
        assert_eq!(outer.range, MicroSeconds(100));
        assert!(outer.contains_window(&inner));
        assert!(!inner.contains_window(&outer));
    }

    #[test]
    fn test_saturating_span_never_negative() {
        assert_eq!(
            MicroSeconds(5).saturating_span(MicroSeconds(10)),
            MicroSeconds::ZERO
        );
    }
}
