//! Virtual time for the simulator
//!
//! Provides the simulated clock used for event ordering, packet timestamps and
//! timer expiry. Nothing here reads the wall clock.

use std::fmt;
use std::ops::{Add, Sub};
use std::time::Duration;

/// Virtual timestamp in microseconds since the start of the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Start of the run
    pub const ZERO: Timestamp = Timestamp(0);

    /// Create a timestamp from microseconds since the start of the run
    #[inline]
    pub fn from_micros(micros: u64) -> Self {
        Timestamp(micros)
    }

    /// Create a timestamp from an offset since the start of the run
    ///
    /// Offsets beyond `u64::MAX` microseconds saturate.
    pub fn from_duration(offset: Duration) -> Self {
        Timestamp(offset.as_micros().try_into().unwrap_or(u64::MAX))
    }

    /// Microseconds since the start of the run
    #[inline]
    pub fn as_micros(&self) -> u64 {
        self.0
    }

    /// Offset since the start of the run
    #[inline]
    pub fn as_duration(&self) -> Duration {
        Duration::from_micros(self.0)
    }

    /// Calculate duration since an earlier timestamp, zero if `earlier` is later
    #[inline]
    pub fn saturating_duration_since(&self, earlier: Timestamp) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, duration: Duration) -> Timestamp {
        let micros: u64 = duration.as_micros().try_into().unwrap_or(u64::MAX);
        Timestamp(self.0.saturating_add(micros))
    }
}

impl Sub for Timestamp {
    type Output = Duration;

    fn sub(self, other: Timestamp) -> Duration {
        self.saturating_duration_since(other)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}s", self.0 / 1_000_000, self.0 % 1_000_000)
    }
}

/// Monotonic virtual clock owned by the event loop
#[derive(Debug, Clone, Default)]
pub struct VirtualClock {
    now: Timestamp,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time
    #[inline]
    pub fn now(&self) -> Timestamp {
        self.now
    }

    /// Jump forward to `at`
    ///
    /// The clock never moves backwards; an earlier `at` leaves it unchanged.
    pub fn advance_to(&mut self, at: Timestamp) {
        if at > self.now {
            self.now = at;
        }
    }
}

/// Time a frame of `bytes` occupies a link running at `rate_bps`
///
/// Rounded up to whole microseconds; a zero rate means no serialization delay.
pub fn transmission_time(bytes: usize, rate_bps: u64) -> Duration {
    if rate_bps == 0 {
        return Duration::ZERO;
    }
    let bits = bytes as u128 * 8 * 1_000_000;
    let micros = (bits + rate_bps as u128 - 1) / rate_bps as u128;
    Duration::from_micros(micros.try_into().unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_arithmetic() {
        let ts1 = Timestamp::from_duration(Duration::from_secs(1));
        let ts2 = ts1 + Duration::from_millis(10);

        assert_eq!(ts2.as_micros(), 1_010_000);
        assert_eq!(ts2 - ts1, Duration::from_millis(10));
        assert_eq!(ts1 - ts2, Duration::ZERO);
    }

    #[test]
    fn test_timestamp_display() {
        let ts = Timestamp::from_micros(3_000_250);
        assert_eq!(ts.to_string(), "3.000250s");
    }

    #[test]
    fn test_clock_never_goes_backwards() {
        let mut clock = VirtualClock::new();
        clock.advance_to(Timestamp::from_micros(500));
        clock.advance_to(Timestamp::from_micros(100));
        assert_eq!(clock.now(), Timestamp::from_micros(500));
    }

    #[test]
    fn test_transmission_time() {
        // 1036 bytes at 1 Mbps = 8288 us
        assert_eq!(
            transmission_time(1036, 1_000_000),
            Duration::from_micros(8288)
        );
        // Rounds up
        assert_eq!(transmission_time(1, 3_000_000), Duration::from_micros(3));
        assert_eq!(transmission_time(1000, 0), Duration::ZERO);
    }
}
