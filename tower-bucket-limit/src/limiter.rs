use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use bucket_limit::Bucket;
use bucket_limit::TokenBucket;
use quanta::Clock;
use quanta::Instant;

use crate::headers::RateLimitHeaders;

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// The outcome of taking a single token from the bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    /// Tokens left after the take, `0` when not admitted.
    pub remaining: u64,
    pub admitted: bool,
}

/// The decision for one request, carrying the headers to attach to the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Admitted(RateLimitHeaders),
    Rejected(RateLimitHeaders),
}

impl Decision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Decision::Admitted(..))
    }

    pub fn headers(&self) -> RateLimitHeaders {
        match self {
            Decision::Admitted(headers) | Decision::Rejected(headers) => *headers,
        }
    }
}

/// A token bucket rate limiter which also remembers when it last admitted a request.
///
/// A `Limiter` is built once, wrapped in an `Arc` and shared by every clone of the
/// service. All state is atomic: admission is a CAS on the bucket and the last
/// admission time only ever moves forward.
#[derive(Debug)]
pub struct Limiter {
    bucket: Box<dyn Bucket>,
    time_window: Duration,
    /// Nanoseconds from `anchor` of the most recent admission.
    last_available: AtomicU64,
    clock: Clock,
    anchor: Instant,
}

impl Limiter {
    /// Allows `rate` requests per second with bursts of up to `capacity`.
    ///
    /// `rate` and `capacity` must be positive; this is not enforced. Use
    /// [`LimiterConfig`](crate::LimiterConfig) for validated construction.
    pub fn per_second(rate: f64, capacity: u64) -> Self {
        Self::per_second_with_clock(rate, capacity, Clock::new())
    }

    pub fn per_second_with_clock(rate: f64, capacity: u64, clock: Clock) -> Self {
        let bucket = TokenBucket::with_rate_and_clock(rate, capacity, clock.clone());
        Self::new(bucket, Duration::from_secs(1), clock)
    }

    /// Allows `capacity` requests per `window`.
    pub fn per_window(window: Duration, capacity: u64) -> Self {
        Self::per_window_with_clock(window, capacity, Clock::new())
    }

    pub fn per_window_with_clock(window: Duration, capacity: u64, clock: Clock) -> Self {
        let bucket = TokenBucket::with_window_and_clock(window, capacity, clock.clone());
        Self::new(bucket, window, clock)
    }

    /// Creates a limiter around any [`Bucket`].
    ///
    /// `clock` is used for reset-time bookkeeping and should be the clock the bucket
    /// reads from.
    pub fn new(bucket: impl Bucket + 'static, time_window: Duration, clock: Clock) -> Self {
        let anchor = clock.now();
        Self {
            bucket: Box::new(bucket),
            time_window,
            last_available: AtomicU64::new(0),
            clock,
            anchor,
        }
    }

    /// Attempts to take one token.
    pub fn try_admit(&self) -> Admission {
        if self.bucket.take_available(1) == 0 {
            return Admission {
                remaining: 0,
                admitted: false,
            };
        }
        Admission {
            remaining: self.bucket.available(),
            admitted: true,
        }
    }

    /// Whole seconds elapsed since the last admitted request.
    ///
    /// This is what `X-RateLimit-Reset` reports. It is not derived from the refill
    /// rate, so it reads `0` straight after the bucket runs dry.
    pub fn reset_time(&self) -> Duration {
        let last = self.last_available.load(Ordering::Acquire);
        let elapsed = self.now().saturating_sub(last);
        Duration::from_secs(elapsed / NANOS_PER_SEC)
    }

    /// Records that a token was available now.
    pub fn mark_available(&self) {
        self.last_available.fetch_max(self.now(), Ordering::AcqRel);
    }

    /// Runs the full admission step for one request.
    pub fn check(&self) -> Decision {
        let admission = self.try_admit();
        let limit = self.capacity();

        if admission.admitted {
            self.mark_available();
            Decision::Admitted(RateLimitHeaders {
                limit,
                remaining: admission.remaining,
                reset: None,
            })
        } else {
            Decision::Rejected(RateLimitHeaders {
                limit,
                remaining: 0,
                reset: Some(self.reset_time()),
            })
        }
    }

    pub fn capacity(&self) -> u64 {
        self.bucket.capacity()
    }

    pub fn available(&self) -> u64 {
        self.bucket.available()
    }

    pub fn time_window(&self) -> Duration {
        self.time_window
    }

    fn now(&self) -> u64 {
        self.clock.now().duration_since(self.anchor).as_nanos() as u64
    }
}
