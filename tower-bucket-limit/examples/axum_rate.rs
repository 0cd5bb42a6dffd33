use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::routing::get;
use tower::BoxError;
use tower_bucket_limit::Limiter;
use tower_bucket_limit::PathPrefix;
use tower_bucket_limit::RateLimitLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tower_bucket_limit=debug")),
        )
        .init();

    // 1. Setup Limiter: 10 requests per second, bursts of 10
    let limiter = Arc::new(Limiter::per_second(10.0, 10));

    // 2. Setup Layer: health checks are never limited
    let layer =
        RateLimitLayer::<Body, Body>::new(limiter).with_bypass(PathPrefix::new("/health"));

    // 3. Build the Router
    let app = Router::new()
        .route("/", get(|| async { "Hello, Bucket!" }))
        .route("/health", get(|| async { "ok" }))
        .layer(layer);

    // 4. Serve
    let listener = tokio::net::TcpListener::bind("127.0.0.1:3100").await?;
    println!("📡 Listening on http://127.0.0.1:3100 (10 req/sec)");

    axum::serve(listener, app).await?;
    Ok(())
}
