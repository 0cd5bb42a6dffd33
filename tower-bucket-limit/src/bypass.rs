use http::Method;
use http::Request;

/// A side-effect free test on an incoming request.
///
/// Used both for exceptions (skip the limiter when any matches) and for filters
/// (only limit when every filter matches). Any `Fn(&Request<B>) -> bool` closure is
/// a predicate.
pub trait BypassPredicate<B>: Send + Sync {
    fn matches(&self, request: &Request<B>) -> bool;
}

impl<F, B> BypassPredicate<B> for F
where
    F: Fn(&Request<B>) -> bool + Send + Sync,
{
    fn matches(&self, request: &Request<B>) -> bool {
        self(request)
    }
}

/// Matches requests with the given method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodIs(pub Method);

impl<B> BypassPredicate<B> for MethodIs {
    fn matches(&self, request: &Request<B>) -> bool {
        *request.method() == self.0
    }
}

/// Matches requests whose path starts with the given prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPrefix(pub String);

impl PathPrefix {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self(prefix.into())
    }
}

impl<B> BypassPredicate<B> for PathPrefix {
    fn matches(&self, request: &Request<B>) -> bool {
        request.uri().path().starts_with(&self.0)
    }
}
