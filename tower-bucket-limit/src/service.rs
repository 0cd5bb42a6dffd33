use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;
use std::task::ready;

use http::Request;
use http::Response;
use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::metrics::Counter;
use pin_project_lite::pin_project;
use tower::Service;
use tracing::debug;
use tracing::trace;

use crate::bypass::BypassPredicate;
use crate::headers::RateLimitHeaders;
use crate::limiter::Decision;
use crate::limiter::Limiter;
use crate::responder::RejectionHandler;

/// Everything about a limiter that is configured rather than counted.
pub(crate) struct Policy<ReqBody, ResBody> {
    pub(crate) responder: Arc<dyn RejectionHandler<ReqBody, ResBody>>,
    pub(crate) bypasses: Vec<Arc<dyn BypassPredicate<ReqBody>>>,
    pub(crate) filters: Vec<Arc<dyn BypassPredicate<ReqBody>>>,
}

// Manually implement Clone: deriving would require the body types to be Clone
impl<ReqBody, ResBody> Clone for Policy<ReqBody, ResBody> {
    fn clone(&self) -> Self {
        Self {
            responder: Arc::clone(&self.responder),
            bypasses: self.bypasses.clone(),
            filters: self.filters.clone(),
        }
    }
}

impl<ReqBody, ResBody> Policy<ReqBody, ResBody> {
    /// A request is limited when no exception matches it and it matches every filter.
    fn applies_to(&self, request: &Request<ReqBody>) -> bool {
        !self.bypasses.iter().any(|p| p.matches(request))
            && self.filters.iter().all(|f| f.matches(request))
    }
}

#[derive(Clone, Debug)]
struct RateLimitServiceMetrics {
    requests: Counter<u64>,
}

impl RateLimitServiceMetrics {
    fn record(&self, outcome: &'static str) {
        self.requests.add(1, &[KeyValue::new("outcome", outcome)]);
    }
}

/// Applies a [`Limiter`] to every request that reaches it.
///
/// Created by [`RateLimitLayer`](crate::RateLimitLayer). Clones share the limiter, so
/// the bucket is shared by every connection the host serves.
pub struct RateLimitService<S, ReqBody, ResBody> {
    inner: S,
    limiter: Arc<Limiter>,
    policy: Arc<Policy<ReqBody, ResBody>>,
    instruments: RateLimitServiceMetrics,
}

impl<S, ReqBody, ResBody> RateLimitService<S, ReqBody, ResBody> {
    pub(crate) fn new(
        inner: S,
        limiter: Arc<Limiter>,
        policy: Arc<Policy<ReqBody, ResBody>>,
    ) -> Self {
        let meter = global::meter("rate_limit_service");
        let instruments = RateLimitServiceMetrics {
            requests: meter.u64_counter("requests").build(),
        };

        Self {
            inner,
            limiter,
            policy,
            instruments,
        }
    }

    pub fn limiter(&self) -> &Arc<Limiter> {
        &self.limiter
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }
}

impl<S, ReqBody, ResBody> Clone for RateLimitService<S, ReqBody, ResBody>
where
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            limiter: Arc::clone(&self.limiter),
            policy: Arc::clone(&self.policy),
            instruments: self.instruments.clone(),
        }
    }
}

impl<S, ReqBody, ResBody> fmt::Debug for RateLimitService<S, ReqBody, ResBody>
where
    S: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitService")
            .field("inner", &self.inner)
            .field("limiter", &self.limiter)
            .field("bypasses", &self.policy.bypasses.len())
            .field("filters", &self.policy.filters.len())
            .finish()
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for RateLimitService<S, ReqBody, ResBody>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = ResponseFuture<S::Future, ResBody>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        if !self.policy.applies_to(&req) {
            trace!(method = %req.method(), uri = %req.uri(), "rate limit bypassed");
            self.instruments.record("bypassed");
            return ResponseFuture::passthrough(self.inner.call(req));
        }

        match self.limiter.check() {
            Decision::Admitted(headers) => {
                trace!(remaining = headers.remaining, "request admitted");
                self.instruments.record("admitted");
                ResponseFuture::admitted(self.inner.call(req), headers)
            }
            Decision::Rejected(headers) => {
                debug!(
                    method = %req.method(),
                    uri = %req.uri(),
                    limit = headers.limit,
                    reset = headers.reset.map(|reset| reset.as_secs()),
                    window = ?self.limiter.time_window(),
                    "rate limit exceeded"
                );
                self.instruments.record("rejected");
                let mut response = self.policy.responder.reject(req);
                headers.apply(response.headers_mut());
                ResponseFuture::rejected(response)
            }
        }
    }
}

pin_project! {
    /// Response future for [`RateLimitService`].
    pub struct ResponseFuture<F, B> {
        #[pin]
        kind: Kind<F, B>,
    }
}

pin_project! {
    #[project = KindProj]
    enum Kind<F, B> {
        Passthrough {
            #[pin]
            future: F,
        },
        Admitted {
            #[pin]
            future: F,
            headers: RateLimitHeaders,
        },
        Rejected {
            response: Option<Response<B>>,
        },
    }
}

impl<F, B> ResponseFuture<F, B> {
    fn passthrough(future: F) -> Self {
        Self {
            kind: Kind::Passthrough { future },
        }
    }

    fn admitted(future: F, headers: RateLimitHeaders) -> Self {
        Self {
            kind: Kind::Admitted { future, headers },
        }
    }

    fn rejected(response: Response<B>) -> Self {
        Self {
            kind: Kind::Rejected {
                response: Some(response),
            },
        }
    }
}

impl<F, B, E> Future for ResponseFuture<F, B>
where
    F: Future<Output = Result<Response<B>, E>>,
{
    type Output = Result<Response<B>, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.project().kind.project() {
            KindProj::Passthrough { future } => future.poll(cx),
            KindProj::Admitted { future, headers } => {
                let mut response = ready!(future.poll(cx))?;
                headers.apply(response.headers_mut());
                Poll::Ready(Ok(response))
            }
            KindProj::Rejected { response } => Poll::Ready(Ok(response
                .take()
                .expect("ResponseFuture polled after completion"))),
        }
    }
}
