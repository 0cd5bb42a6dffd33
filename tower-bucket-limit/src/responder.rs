use http::Request;
use http::Response;
use http::StatusCode;

/// Produces the response for a request which exceeded the rate limit.
///
/// The handler receives the original request and must return a complete response;
/// nothing downstream of the limiter runs for a rejected request. The
/// `X-RateLimit-*` headers are added afterwards unless the handler already set them.
///
/// Any `Fn(Request<ReqBody>) -> Response<ResBody>` closure is a handler.
pub trait RejectionHandler<ReqBody, ResBody>: Send + Sync {
    fn reject(&self, request: Request<ReqBody>) -> Response<ResBody>;
}

impl<F, ReqBody, ResBody> RejectionHandler<ReqBody, ResBody> for F
where
    F: Fn(Request<ReqBody>) -> Response<ResBody> + Send + Sync,
{
    fn reject(&self, request: Request<ReqBody>) -> Response<ResBody> {
        self(request)
    }
}

/// The default handler: `429 Too Many Requests` with a plain text body.
#[derive(Debug, Clone, Copy, Default)]
pub struct TooManyRequests;

impl TooManyRequests {
    pub const BODY: &'static str = "Too Many Requests";
}

impl<ReqBody, ResBody> RejectionHandler<ReqBody, ResBody> for TooManyRequests
where
    ResBody: From<&'static str>,
{
    fn reject(&self, _request: Request<ReqBody>) -> Response<ResBody> {
        let mut response = Response::new(ResBody::from(Self::BODY));
        *response.status_mut() = StatusCode::TOO_MANY_REQUESTS;
        response
    }
}
