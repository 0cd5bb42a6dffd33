//! # bucket-limit
//!
//! `bucket-limit` provides a lock-free token bucket with continuous refill.
//!
//! ## Core Philosophy
//!
//! The bucket state is a single `AtomicU64` holding a theoretical arrival time. Taking
//! tokens is a Compare-And-Swap loop on that value, so concurrent callers can never
//! jointly take more tokens than the bucket holds, and no `Mutex` is ever involved.
//!
//! ## Key Concepts
//!
//! * **Lazy Refill**: Tokens are recalculated from the clock at the moment of the call.
//!   There are no background threads or timers.
//! * **Injectable Clock**: Every constructor has a variant taking a [`quanta::Clock`], so
//!   tests can drive time with `Clock::mock()`.
//! * **Bucket Trait**: The three operations a consumer needs (`take_available`,
//!   `capacity`, `available`) are exposed through [`Bucket`], so callers can substitute
//!   their own implementation.
//!
//! ## Example
//!
//! ```rust
//! use bucket_limit::Bucket;
//! use bucket_limit::TokenBucket;
//! use std::time::Duration;
//!
//! // 10 tokens per minute
//! let bucket = TokenBucket::with_window(Duration::from_secs(60), 10);
//!
//! if bucket.take_available(1) == 1 {
//!     // Request allowed
//! }
//! assert_eq!(bucket.available(), 9);
//! ```

use std::fmt::Debug;

mod token_bucket;

pub use token_bucket::TokenBucket;

/// The token-bucket contract consumed by rate limiters.
///
/// Implementations must be `Send` and `Sync` so a single bucket can be shared across
/// threads via `Arc`, and `take_available` must be atomic with respect to the token
/// count.
pub trait Bucket: Debug + Send + Sync {
    /// Takes up to `count` tokens, returning how many were actually taken.
    ///
    /// Returns `0` if the bucket is empty. Never blocks.
    fn take_available(&self, count: u64) -> u64;

    /// The maximum number of tokens the bucket can hold.
    fn capacity(&self) -> u64;

    /// The number of tokens available right now.
    fn available(&self) -> u64;
}
