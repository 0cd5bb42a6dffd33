use std::time::Duration;

use bucket_limit::TokenBucket;
use quanta::Clock;
use serde::Deserialize;
use serde::Serialize;

use crate::LimitError;
use crate::Limiter;

/// Declarative description of a [`Limiter`].
///
/// ```json
/// { "strategy": "rate", "rate": 10.0, "capacity": 10 }
/// { "strategy": "window", "window": "1m", "capacity": 10 }
/// ```
///
/// Windows are written as `humantime` durations (`"500ms"`, `"1m"`, `"1h 30m"`).
/// Unlike the [`Limiter`] constructors, [`LimiterConfig::build`] rejects
/// non-positive values and capacities above [`TokenBucket::MAX_CAPACITY`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum LimiterConfig {
    /// `rate` tokens per second, bursts of up to `capacity`.
    Rate { rate: f64, capacity: u64 },
    /// `capacity` tokens per `window`.
    Window {
        #[serde(with = "humantime_duration")]
        window: Duration,
        capacity: u64,
    },
}

impl LimiterConfig {
    pub fn from_json(json: &str) -> Result<Self, LimitError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn build(&self) -> Result<Limiter, LimitError> {
        self.build_with_clock(Clock::new())
    }

    pub fn build_with_clock(&self, clock: Clock) -> Result<Limiter, LimitError> {
        self.validate()?;
        let limiter = match *self {
            LimiterConfig::Rate { rate, capacity } => {
                Limiter::per_second_with_clock(rate, capacity, clock)
            }
            LimiterConfig::Window { window, capacity } => {
                Limiter::per_window_with_clock(window, capacity, clock)
            }
        };
        Ok(limiter)
    }

    fn validate(&self) -> Result<(), LimitError> {
        let capacity = match *self {
            LimiterConfig::Rate { rate, capacity } => {
                if !(rate.is_finite() && rate > 0.0) {
                    return Err(LimitError::InvalidRate { rate });
                }
                capacity
            }
            LimiterConfig::Window { window, capacity } => {
                if window.is_zero() {
                    return Err(LimitError::InvalidWindow);
                }
                capacity
            }
        };
        if capacity == 0 || capacity > TokenBucket::MAX_CAPACITY {
            return Err(LimitError::InvalidCapacity {
                capacity,
                max: TokenBucket::MAX_CAPACITY,
            });
        }
        Ok(())
    }
}

mod humantime_duration {
    use std::time::Duration;

    use serde::Deserialize;
    use serde::Deserializer;
    use serde::Serializer;

    pub(super) fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&humantime::format_duration(*duration))
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        humantime::parse_duration(&value).map_err(serde::de::Error::custom)
    }
}
