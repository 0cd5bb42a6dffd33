use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use http::HeaderMap;
use http::Method;
use http::Request;
use http::Response;
use http::StatusCode;
use quanta::Clock;
use tower::BoxError;
use tower::Layer;
use tower::Service;
use tower::ServiceBuilder;
use tower::ServiceExt;
use tower::service_fn;

use super::*;

type TestLayer = RateLimitLayer<String, String>;

/// A downstream handler which counts its calls and answers `200 foo`.
fn downstream(
    calls: Arc<AtomicUsize>,
) -> impl Service<Request<String>, Response = Response<String>, Error = Infallible, Future: Send>
+ Clone
+ Send {
    service_fn(move |_req: Request<String>| {
        let calls = calls.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Infallible>(Response::new("foo".to_string()))
        }
    })
}

fn request(method: Method, uri: &str) -> Request<String> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(String::new())
        .unwrap()
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .map(|value| value.to_str().unwrap())
        .unwrap_or("")
}

fn has_rate_limit_headers(headers: &HeaderMap) -> bool {
    headers.contains_key(X_RATELIMIT_LIMIT)
        || headers.contains_key(X_RATELIMIT_REMAINING)
        || headers.contains_key(X_RATELIMIT_RESET)
}

async fn send<S>(service: &mut S, req: Request<String>) -> Response<String>
where
    S: Service<Request<String>, Response = Response<String>, Error = Infallible>,
{
    service.ready().await.unwrap().call(req).await.unwrap()
}

fn mocked_per_second(rate: f64, capacity: u64) -> (Arc<Limiter>, Arc<quanta::Mock>) {
    let (clock, mock) = Clock::mock();
    let limiter = Limiter::per_second_with_clock(rate, capacity, clock);
    (Arc::new(limiter), mock)
}

#[tokio::test]
async fn test_admits_first_request() {
    let (limiter, _mock) = mocked_per_second(5.0, 5);
    let calls = Arc::new(AtomicUsize::new(0));
    let mut service = TestLayer::new(limiter).layer(downstream(calls.clone()));

    let response = send(&mut service, request(Method::GET, "/")).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.body(), "foo");
    assert_eq!(header(response.headers(), "X-RateLimit-Limit"), "5");
    assert_eq!(header(response.headers(), "X-RateLimit-Remaining"), "4");
    assert_eq!(header(response.headers(), "X-RateLimit-Reset"), "");
}

#[tokio::test]
async fn test_rejects_once_exhausted() {
    let (limiter, _mock) = mocked_per_second(5.0, 5);
    let calls = Arc::new(AtomicUsize::new(0));
    let mut service = TestLayer::new(limiter).layer(downstream(calls.clone()));

    for i in 0..10 {
        let response = send(&mut service, request(Method::GET, "/")).await;
        let headers = response.headers();

        assert_eq!(header(headers, "X-RateLimit-Limit"), "5");

        if i < 5 {
            assert_eq!(calls.load(Ordering::SeqCst), i + 1);
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(response.body(), "foo");
            assert_eq!(
                header(headers, "X-RateLimit-Remaining"),
                (5 - (i + 1)).to_string()
            );
            assert_eq!(header(headers, "X-RateLimit-Reset"), "");
        } else {
            assert_eq!(calls.load(Ordering::SeqCst), 5);
            assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
            assert_eq!(response.body(), "Too Many Requests");
            assert_eq!(header(headers, "X-RateLimit-Remaining"), "0");
            assert_eq!(header(headers, "X-RateLimit-Reset"), "0");
        }
    }
}

#[tokio::test]
async fn test_exceptions_skip_the_limiter() {
    let (limiter, _mock) = mocked_per_second(5.0, 5);
    let calls = Arc::new(AtomicUsize::new(0));
    let mut service = TestLayer::new(limiter.clone())
        .with_bypass(|req: &Request<String>| *req.method() == Method::GET)
        .with_bypass(MethodIs(Method::PUT))
        .layer(downstream(calls.clone()));

    // Pass exceptions
    for method in [Method::GET, Method::PUT] {
        let response = send(&mut service, request(method, "/")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body(), "foo");
        assert!(!has_rate_limit_headers(response.headers()));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(limiter.available(), 5, "bypassed requests must not take tokens");

    // Do not pass exceptions
    let response = send(&mut service, request(Method::POST, "/")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(response.headers(), "X-RateLimit-Limit"), "5");
    assert_eq!(header(response.headers(), "X-RateLimit-Remaining"), "4");
    assert_eq!(header(response.headers(), "X-RateLimit-Reset"), "");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_filters_scope_the_limiter() {
    let (limiter, _mock) = mocked_per_second(5.0, 5);
    let calls = Arc::new(AtomicUsize::new(0));
    let mut service = TestLayer::new(limiter.clone())
        .with_filter(MethodIs(Method::GET))
        .with_filter(|req: &Request<String>| req.uri().path() == "/")
        .layer(downstream(calls.clone()));

    // Matches every filter, so it is limited
    let response = send(&mut service, request(Method::GET, "/")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(response.headers(), "X-RateLimit-Limit"), "5");
    assert_eq!(header(response.headers(), "X-RateLimit-Remaining"), "4");
    assert_eq!(header(response.headers(), "X-RateLimit-Reset"), "");

    // Fails a filter, so it passes through untouched
    for req in [request(Method::POST, "/"), request(Method::GET, "/other")] {
        let response = send(&mut service, req).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body(), "foo");
        assert!(!has_rate_limit_headers(response.headers()));
    }

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(limiter.available(), 4);
}

#[tokio::test]
async fn test_exceptions_win_over_filters() {
    let (limiter, _mock) = mocked_per_second(5.0, 5);
    let calls = Arc::new(AtomicUsize::new(0));
    let mut service = TestLayer::new(limiter.clone())
        .with_filter(MethodIs(Method::GET))
        .with_bypass(PathPrefix::new("/health"))
        .layer(downstream(calls.clone()));

    let response = send(&mut service, request(Method::GET, "/health")).await;
    assert!(!has_rate_limit_headers(response.headers()));
    assert_eq!(limiter.available(), 5);
}

#[tokio::test]
async fn test_custom_responder() {
    let (clock, _mock) = Clock::mock();
    let limiter = Arc::new(Limiter::per_window_with_clock(
        Duration::from_secs(1),
        1,
        clock,
    ));
    let calls = Arc::new(AtomicUsize::new(0));
    let mut service = TestLayer::new(limiter)
        .with_responder(|_req: Request<String>| {
            Response::builder()
                .status(StatusCode::TOO_MANY_REQUESTS)
                .body("wait, dude".to_string())
                .unwrap()
        })
        .layer(downstream(calls.clone()));

    let response = send(&mut service, request(Method::GET, "/")).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(response.body(), "foo");
    assert_eq!(header(response.headers(), "X-RateLimit-Remaining"), "0");

    let response = send(&mut service, request(Method::GET, "/")).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.body(), "wait, dude");
    assert_eq!(header(response.headers(), "X-RateLimit-Limit"), "1");
    assert_eq!(header(response.headers(), "X-RateLimit-Remaining"), "0");
    assert_eq!(header(response.headers(), "X-RateLimit-Reset"), "0");
}

#[tokio::test]
async fn test_responder_receives_the_request() {
    let (limiter, _mock) = mocked_per_second(1.0, 0);
    let calls = Arc::new(AtomicUsize::new(0));
    let mut service = TestLayer::with_rejection_handler(limiter, |req: Request<String>| {
        Response::builder()
            .status(StatusCode::SERVICE_UNAVAILABLE)
            .header("x-ratelimit-reset", "60")
            .body(format!("{} {} throttled", req.method(), req.uri()))
            .unwrap()
    })
    .layer(downstream(calls.clone()));

    let response = send(&mut service, request(Method::DELETE, "/items/1")).await;

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.body(), "DELETE /items/1 throttled");
    // The responder's own header is kept
    assert_eq!(header(response.headers(), "X-RateLimit-Reset"), "60");
    assert_eq!(header(response.headers(), "X-RateLimit-Limit"), "0");
}

#[tokio::test]
async fn test_bypass_is_idempotent() {
    let (limiter, _mock) = mocked_per_second(1.0, 1);
    let calls = Arc::new(AtomicUsize::new(0));
    let mut service = TestLayer::new(limiter.clone())
        .with_bypasses([PathPrefix::new("/health"), PathPrefix::new("/metrics")])
        .layer(downstream(calls.clone()));

    let first = send(&mut service, request(Method::GET, "/metrics")).await;
    let second = send(&mut service, request(Method::GET, "/metrics")).await;

    assert_eq!(first.headers(), second.headers());
    assert!(first.headers().is_empty());
    assert_eq!(limiter.available(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_reset_tracks_last_admission() {
    let (clock, mock) = Clock::mock();
    let limiter = Arc::new(Limiter::per_window_with_clock(
        Duration::from_secs(60),
        1,
        clock,
    ));
    let calls = Arc::new(AtomicUsize::new(0));
    let mut service = TestLayer::new(limiter).layer(downstream(calls.clone()));

    mock.increment(Duration::from_secs(30));
    let response = send(&mut service, request(Method::GET, "/")).await;
    assert_eq!(response.status(), StatusCode::OK);

    mock.increment(Duration::from_millis(2_500));
    let response = send(&mut service, request(Method::GET, "/")).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(header(response.headers(), "X-RateLimit-Reset"), "2");
}

#[tokio::test]
async fn test_recovers_after_refill() {
    let (limiter, mock) = mocked_per_second(1.0, 1);
    let calls = Arc::new(AtomicUsize::new(0));
    let mut service = TestLayer::new(limiter).layer(downstream(calls.clone()));

    assert_eq!(
        send(&mut service, request(Method::GET, "/")).await.status(),
        StatusCode::OK
    );
    assert_eq!(
        send(&mut service, request(Method::GET, "/")).await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );

    mock.increment(Duration::from_secs(1));

    let response = send(&mut service, request(Method::GET, "/")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(response.headers(), "X-RateLimit-Remaining"), "0");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_downstream_headers_win() {
    let (limiter, _mock) = mocked_per_second(5.0, 5);
    let inner = service_fn(|_req: Request<String>| async {
        Ok::<_, Infallible>(
            Response::builder()
                .header("x-ratelimit-limit", "upstream")
                .body("foo".to_string())
                .unwrap(),
        )
    });
    let mut service = TestLayer::new(limiter).layer(inner);

    let response = send(&mut service, request(Method::GET, "/")).await;
    assert_eq!(header(response.headers(), "X-RateLimit-Limit"), "upstream");
    assert_eq!(header(response.headers(), "X-RateLimit-Remaining"), "4");
}

#[tokio::test]
async fn test_inner_errors_pass_through() {
    let (limiter, _mock) = mocked_per_second(5.0, 5);
    let inner = service_fn(|_req: Request<String>| async {
        Err::<Response<String>, BoxError>("database down".into())
    });
    let service = TestLayer::new(limiter.clone()).layer(inner);

    let err = service
        .oneshot(request(Method::GET, "/"))
        .await
        .expect_err("inner error should propagate");
    assert_eq!(err.to_string(), "database down");
    // The token was still spent on admission
    assert_eq!(limiter.available(), 4);
}

#[tokio::test]
async fn test_shared_state_across_clones() {
    let (limiter, _mock) = mocked_per_second(1.0, 1);
    let layer = TestLayer::new(limiter);

    let calls = Arc::new(AtomicUsize::new(0));
    let mut svc1 = layer.layer(downstream(calls.clone()));
    let mut svc2 = layer.layer(downstream(calls.clone()));

    let response = send(&mut svc1, request(Method::GET, "/")).await;
    assert_eq!(response.status(), StatusCode::OK);

    // svc2 is throttled because svc1 used the token
    let response = send(&mut svc2, request(Method::GET, "/")).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_hammer() {
    let capacity = 20;
    let attempts = 50;
    let (limiter, _mock) = mocked_per_second(1.0, capacity);
    let calls = Arc::new(AtomicUsize::new(0));
    let service = TestLayer::new(limiter.clone()).layer(downstream(calls.clone()));

    let mut handles = vec![];
    for _ in 0..attempts {
        let svc = service.clone();
        handles.push(tokio::spawn(async move {
            let response = svc.oneshot(request(Method::GET, "/")).await.unwrap();
            let remaining: u64 = header(response.headers(), "X-RateLimit-Remaining")
                .parse()
                .unwrap();
            (response.status(), remaining)
        }));
    }

    let results: Vec<(StatusCode, u64)> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.expect("task panicked"))
        .collect();

    let admitted = results
        .iter()
        .filter(|(status, _)| *status == StatusCode::OK)
        .count();
    let rejected = results
        .iter()
        .filter(|(status, _)| *status == StatusCode::TOO_MANY_REQUESTS)
        .count();

    assert_eq!(admitted, capacity as usize);
    assert_eq!(rejected, attempts - capacity as usize);
    assert!(results.iter().all(|(_, remaining)| *remaining < capacity));
    assert_eq!(calls.load(Ordering::SeqCst), capacity as usize);
    assert_eq!(limiter.available(), 0);
}

#[tokio::test]
async fn test_service_builder_ext() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut service = ServiceBuilder::new()
        .rate_limit_per_window::<String, String>(Duration::from_secs(3600), 2)
        .service(downstream(calls.clone()));

    let statuses = [
        send(&mut service, request(Method::GET, "/")).await.status(),
        send(&mut service, request(Method::GET, "/")).await.status(),
        send(&mut service, request(Method::GET, "/")).await.status(),
    ];

    assert_eq!(
        statuses,
        [
            StatusCode::OK,
            StatusCode::OK,
            StatusCode::TOO_MANY_REQUESTS
        ]
    );
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_layer_from_config() {
    let (clock, _mock) = Clock::mock();
    let limiter = LimiterConfig::from_json(r#"{"strategy": "window", "window": "1m", "capacity": 3}"#)
        .unwrap()
        .build_with_clock(clock)
        .unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut service = ServiceBuilder::new()
        .bucket_limit(TestLayer::new(Arc::new(limiter)))
        .service(downstream(calls.clone()));

    let response = send(&mut service, request(Method::GET, "/")).await;
    assert_eq!(header(response.headers(), "X-RateLimit-Limit"), "3");
    assert_eq!(header(response.headers(), "X-RateLimit-Remaining"), "2");
}
