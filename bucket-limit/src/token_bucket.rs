use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use quanta::Clock;
use quanta::Instant;

use super::Bucket;

/// A token bucket which refills continuously, one token every `interval`.
///
/// Internally this is a cell rate algorithm: `tat` is the theoretical arrival time of
/// the next token, and the bucket holds `capacity` tokens once `now` has caught up
/// with it. Tokens are never stored, only derived from `now - tat`.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: u64,
    /// Theoretical Arrival Time (TAT) in nanoseconds from `anchor`.
    tat: AtomicU64,
    interval_ns: u64,
    /// `capacity * interval_ns`: how far ahead of `now` the TAT may run.
    tolerance_ns: u64,
    clock: Clock,
    anchor: Instant,
}

impl Bucket for TokenBucket {
    #[inline]
    fn take_available(&self, count: u64) -> u64 {
        if count == 0 {
            return 0;
        }
        let now = self.now();
        let mut tat = self.tat.load(Ordering::Acquire);

        loop {
            let take = self.available_at(now, tat).min(count);
            if take == 0 {
                return 0;
            }
            let next_tat = tat.max(now) + take * self.interval_ns;

            match self.tat.compare_exchange_weak(
                tat,
                next_tat,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return take,
                Err(actual) => tat = actual,
            }
        }
    }

    fn capacity(&self) -> u64 {
        self.capacity
    }

    fn available(&self) -> u64 {
        self.available_at(self.now(), self.tat.load(Ordering::Acquire))
    }
}

impl TokenBucket {
    /// The largest capacity a bucket can hold. Larger capacities are capped to it.
    pub const MAX_CAPACITY: u64 = u64::MAX / 4;

    /// Creates a bucket which refills at `rate` tokens per second.
    ///
    /// `rate` and `capacity` must be positive; this is not enforced. A non-positive or
    /// non-finite `rate` gives a bucket which effectively never refills, and a zero
    /// `capacity` gives a bucket which is always empty. Rates above one token per
    /// nanosecond (`1e9`) refill at exactly one token per nanosecond.
    pub fn with_rate(rate: f64, capacity: u64) -> Self {
        Self::with_rate_and_clock(rate, capacity, Clock::new())
    }

    pub fn with_rate_and_clock(rate: f64, capacity: u64, clock: Clock) -> Self {
        Self::from_interval(rate_interval(rate), capacity, clock)
    }

    /// Creates a bucket which allows `capacity` tokens per `window`.
    ///
    /// The bucket refills continuously at `capacity / window`, it is not reset at window
    /// boundaries.
    pub fn with_window(window: Duration, capacity: u64) -> Self {
        Self::with_window_and_clock(window, capacity, Clock::new())
    }

    pub fn with_window_and_clock(window: Duration, capacity: u64, clock: Clock) -> Self {
        let interval = window.as_nanos() / u128::from(capacity.max(1));
        let interval = Duration::from_nanos(u64::try_from(interval).unwrap_or(u64::MAX));
        Self::from_interval(interval, capacity, clock)
    }

    /// Creates a full bucket which gains one token every `interval`.
    ///
    /// `capacity` is capped at [`TokenBucket::MAX_CAPACITY`]. The interval is then
    /// clamped so that `capacity * interval` always fits comfortably in the nanosecond
    /// arithmetic; a zero interval becomes one nanosecond.
    pub fn from_interval(interval: Duration, capacity: u64, clock: Clock) -> Self {
        let capacity = capacity.min(Self::MAX_CAPACITY);
        let max_interval = Self::MAX_CAPACITY / capacity.max(1);
        let interval_ns = u64::try_from(interval.as_nanos())
            .unwrap_or(u64::MAX)
            .clamp(1, max_interval);
        let anchor = clock.now();

        Self {
            capacity,
            tat: AtomicU64::new(0),
            interval_ns,
            tolerance_ns: interval_ns * capacity,
            clock,
            anchor,
        }
    }

    /// The time it takes to gain a single token.
    pub fn interval(&self) -> Duration {
        Duration::from_nanos(self.interval_ns)
    }

    /// The clock this bucket reads time from.
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    fn now(&self) -> u64 {
        self.clock.now().duration_since(self.anchor).as_nanos() as u64
    }

    fn available_at(&self, now: u64, tat: u64) -> u64 {
        // When the TAT is in the past the bucket is full: the result is exactly capacity.
        let horizon = now.saturating_add(self.tolerance_ns);
        horizon.saturating_sub(tat.max(now)) / self.interval_ns
    }
}

fn rate_interval(rate: f64) -> Duration {
    if rate.is_finite() && rate > 0.0 {
        Duration::try_from_secs_f64(rate.recip()).unwrap_or(Duration::MAX)
    } else {
        Duration::MAX
    }
}
