/// Errors produced while building a limiter from configuration.
///
/// The admission path itself never fails: a rejected request is an ordinary
/// `429` response, not an error.
#[derive(Debug, thiserror::Error)]
pub enum LimitError {
    /// The refill rate was zero, negative or not a finite number.
    #[error("rate must be a positive, finite number of tokens per second; got {rate}")]
    InvalidRate {
        /// The rejected rate.
        rate: f64,
    },

    /// The bucket capacity was zero or above [`TokenBucket::MAX_CAPACITY`](bucket_limit::TokenBucket::MAX_CAPACITY).
    #[error("capacity must be between 1 and {max}; got {capacity}")]
    InvalidCapacity {
        /// The rejected capacity.
        capacity: u64,
        /// The largest supported capacity.
        max: u64,
    },

    /// The time window was zero.
    #[error("time window must be longer than zero")]
    InvalidWindow,

    /// The configuration could not be parsed.
    #[error("invalid limiter configuration: {0}")]
    Parse(#[from] serde_json::Error),
}
