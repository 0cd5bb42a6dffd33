//! # Tower Bucket Limit
//!
//! `tower-bucket-limit` is a token bucket rate limiter for HTTP services built on
//! [Tower](https://github.com/tower-rs/tower).
//!
//! For every request the [`RateLimitService`] either admits it to the inner service or
//! answers it directly with a rejection (by default `429 Too Many Requests`). Unlike
//! raw rate limiters it never returns `Poll::Pending` to wait for capacity and never
//! turns a rejection into a service error: a rejection is an ordinary HTTP response.
//!
//! ## Headers
//!
//! Every limited request is answered with:
//!
//! - `X-RateLimit-Limit`: the bucket capacity.
//! - `X-RateLimit-Remaining`: tokens left after this request.
//! - `X-RateLimit-Reset`: on rejections only, the whole seconds since the last admitted
//!   request.
//!
//! ## Exceptions and filters
//!
//! [`RateLimitLayer::with_bypass`] registers exceptions: a request matching any of
//! them skips the limiter. [`RateLimitLayer::with_filter`] narrows the limiter to
//! requests matching every filter. Skipped requests consume no tokens and get no
//! headers.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use http::Method;
//! use tower::ServiceBuilder;
//! use tower_bucket_limit::Limiter;
//! use tower_bucket_limit::MethodIs;
//! use tower_bucket_limit::RateLimitLayer;
//!
//! // 10 requests per second, bursts of 10, OPTIONS is never limited
//! let layer = RateLimitLayer::<String, String>::new(Arc::new(Limiter::per_second(10.0, 10)))
//!     .with_bypass(MethodIs(Method::OPTIONS));
//!
//! let service = ServiceBuilder::new()
//!     .layer(layer)
//!     .service_fn(|_req: http::Request<String>| async {
//!         Ok::<_, std::convert::Infallible>(http::Response::new("ok".to_string()))
//!     });
//! # drop(service);
//! ```

mod bypass;
mod config;
mod error;
mod headers;
mod layer;
mod limiter;
mod responder;
mod service;
mod utils;

#[cfg(test)]
mod tests;

pub use bypass::BypassPredicate;
pub use bypass::MethodIs;
pub use bypass::PathPrefix;
pub use config::LimiterConfig;
pub use error::LimitError;
pub use headers::RateLimitHeaders;
pub use headers::X_RATELIMIT_LIMIT;
pub use headers::X_RATELIMIT_REMAINING;
pub use headers::X_RATELIMIT_RESET;
pub use layer::RateLimitLayer;
pub use limiter::Admission;
pub use limiter::Decision;
pub use limiter::Limiter;
pub use responder::RejectionHandler;
pub use responder::TooManyRequests;
pub use service::RateLimitService;
pub use service::ResponseFuture;
pub use utils::ServiceBuilderExt;
