use std::fmt;
use std::sync::Arc;

use tower::Layer;

use crate::bypass::BypassPredicate;
use crate::limiter::Limiter;
use crate::responder::RejectionHandler;
use crate::responder::TooManyRequests;
use crate::service::Policy;
use crate::service::RateLimitService;

/// Applies a token bucket rate limit to HTTP requests.
///
/// Every service produced by this layer (and every clone of those services) shares the
/// same [`Limiter`]. Configure the layer before it starts serving traffic.
pub struct RateLimitLayer<ReqBody, ResBody> {
    limiter: Arc<Limiter>,
    policy: Arc<Policy<ReqBody, ResBody>>,
}

impl<ReqBody, ResBody> Clone for RateLimitLayer<ReqBody, ResBody> {
    fn clone(&self) -> Self {
        Self {
            limiter: Arc::clone(&self.limiter),
            policy: Arc::clone(&self.policy),
        }
    }
}

impl<ReqBody, ResBody> fmt::Debug for RateLimitLayer<ReqBody, ResBody> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitLayer")
            .field("limiter", &self.limiter)
            .field("bypasses", &self.policy.bypasses.len())
            .field("filters", &self.policy.filters.len())
            .finish()
    }
}

impl<ReqBody, ResBody> RateLimitLayer<ReqBody, ResBody>
where
    ResBody: From<&'static str>,
{
    /// Create a RateLimitLayer which rejects with `429 Too Many Requests`.
    pub fn new(limiter: Arc<Limiter>) -> Self {
        Self::with_rejection_handler(limiter, TooManyRequests)
    }
}

impl<ReqBody, ResBody> RateLimitLayer<ReqBody, ResBody> {
    /// Create a RateLimitLayer with a custom rejection handler.
    ///
    /// Unlike [`RateLimitLayer::new`] this places no bound on the response body.
    pub fn with_rejection_handler<R>(limiter: Arc<Limiter>, responder: R) -> Self
    where
        R: RejectionHandler<ReqBody, ResBody> + 'static,
    {
        Self {
            limiter,
            policy: Arc::new(Policy {
                responder: Arc::new(responder),
                bypasses: Vec::new(),
                filters: Vec::new(),
            }),
        }
    }

    /// Replace the response produced for rejected requests.
    pub fn with_responder<R>(mut self, responder: R) -> Self
    where
        R: RejectionHandler<ReqBody, ResBody> + 'static,
    {
        Arc::make_mut(&mut self.policy).responder = Arc::new(responder);
        self
    }

    /// Add an exception: requests matching it skip the limiter entirely.
    ///
    /// Exceptions are checked in the order they were added and the first match wins.
    pub fn with_bypass<P>(mut self, predicate: P) -> Self
    where
        P: BypassPredicate<ReqBody> + 'static,
    {
        Arc::make_mut(&mut self.policy)
            .bypasses
            .push(Arc::new(predicate));
        self
    }

    /// Add several exceptions at once.
    pub fn with_bypasses<P, I>(mut self, predicates: I) -> Self
    where
        P: BypassPredicate<ReqBody> + 'static,
        I: IntoIterator<Item = P>,
    {
        let policy = Arc::make_mut(&mut self.policy);
        for predicate in predicates {
            policy.bypasses.push(Arc::new(predicate));
        }
        self
    }

    /// Add a filter: once any filter is set, only requests matching every filter are
    /// limited. The rest pass through untouched.
    pub fn with_filter<P>(mut self, predicate: P) -> Self
    where
        P: BypassPredicate<ReqBody> + 'static,
    {
        Arc::make_mut(&mut self.policy)
            .filters
            .push(Arc::new(predicate));
        self
    }

    pub fn limiter(&self) -> &Arc<Limiter> {
        &self.limiter
    }
}

impl<S, ReqBody, ResBody> Layer<S> for RateLimitLayer<ReqBody, ResBody> {
    type Service = RateLimitService<S, ReqBody, ResBody>;

    fn layer(&self, service: S) -> Self::Service {
        RateLimitService::new(service, Arc::clone(&self.limiter), Arc::clone(&self.policy))
    }
}
