use std::sync::Arc;
use std::time::Duration;

use tower::ServiceBuilder;
use tower::layer::util::Stack;

use crate::Limiter;
use crate::RateLimitLayer;

/// Service Builder Extension with rate limiting shorthands for tower::ServiceBuilder.
///
/// Layers added to a `ServiceBuilder` run in the order they are added, so calling
/// these first makes the limiter the outermost middleware: nothing else runs for a
/// rejected request.
pub trait ServiceBuilderExt<L> {
    /// Add a configured rate limit layer
    fn bucket_limit<ReqBody, ResBody>(
        self,
        layer: RateLimitLayer<ReqBody, ResBody>,
    ) -> ServiceBuilder<Stack<RateLimitLayer<ReqBody, ResBody>, L>>;

    /// Allow `rate` requests per second, in bursts of up to `capacity`
    fn rate_limit_per_second<ReqBody, ResBody>(
        self,
        rate: f64,
        capacity: u64,
    ) -> ServiceBuilder<Stack<RateLimitLayer<ReqBody, ResBody>, L>>
    where
        ResBody: From<&'static str>;

    /// Allow `capacity` requests per `window`
    fn rate_limit_per_window<ReqBody, ResBody>(
        self,
        window: Duration,
        capacity: u64,
    ) -> ServiceBuilder<Stack<RateLimitLayer<ReqBody, ResBody>, L>>
    where
        ResBody: From<&'static str>;
}

impl<L> ServiceBuilderExt<L> for ServiceBuilder<L> {
    fn bucket_limit<ReqBody, ResBody>(
        self,
        layer: RateLimitLayer<ReqBody, ResBody>,
    ) -> ServiceBuilder<Stack<RateLimitLayer<ReqBody, ResBody>, L>> {
        self.layer(layer)
    }

    fn rate_limit_per_second<ReqBody, ResBody>(
        self,
        rate: f64,
        capacity: u64,
    ) -> ServiceBuilder<Stack<RateLimitLayer<ReqBody, ResBody>, L>>
    where
        ResBody: From<&'static str>,
    {
        let limiter = Arc::new(Limiter::per_second(rate, capacity));
        self.layer(RateLimitLayer::new(limiter))
    }

    fn rate_limit_per_window<ReqBody, ResBody>(
        self,
        window: Duration,
        capacity: u64,
    ) -> ServiceBuilder<Stack<RateLimitLayer<ReqBody, ResBody>, L>>
    where
        ResBody: From<&'static str>,
    {
        let limiter = Arc::new(Limiter::per_window(window, capacity));
        self.layer(RateLimitLayer::new(limiter))
    }
}
