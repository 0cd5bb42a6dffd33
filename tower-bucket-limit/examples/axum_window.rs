use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::Request;
use axum::http::Response;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::routing::get;
use tower::BoxError;
use tower_bucket_limit::Limiter;
use tower_bucket_limit::RateLimitLayer;
use tracing_subscriber::EnvFilter;

/// Rejects with a JSON body instead of the default plain text.
fn json_rejection(req: Request<Body>) -> Response<Body> {
    let body = serde_json::json!({
        "error": "rate limit exceeded",
        "path": req.uri().path(),
    })
    .to_string();
    Response::builder()
        .status(StatusCode::TOO_MANY_REQUESTS)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tower_bucket_limit=debug")),
        )
        .init();

    // 10 requests per minute
    let limiter = Arc::new(Limiter::per_window(Duration::from_secs(60), 10));
    let layer = RateLimitLayer::<Body, Body>::new(limiter).with_responder(json_rejection);

    let app = Router::new()
        .route("/", get(|| async { "Hello, Bucket!" }))
        .layer(layer);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:3100").await?;
    println!("📡 Listening on http://127.0.0.1:3100 (10 req/min)");

    axum::serve(listener, app).await?;
    Ok(())
}
