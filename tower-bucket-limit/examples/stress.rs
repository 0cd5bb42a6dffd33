use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use clap::Parser;
use hdrhistogram::Histogram;
use http::Request;
use http::Response;
use http::StatusCode;
use tokio::sync::Barrier;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tower::BoxError;
use tower::Layer;
use tower::Service;
use tower::ServiceExt;
use tower::service_fn;
use tower_bucket_limit::Limiter;
use tower_bucket_limit::RateLimitLayer;
use tracing_subscriber::EnvFilter;

/// Fire a burst of concurrent requests through a token bucket limiter.
#[derive(Debug, Parser)]
struct Args {
    /// Total number of requests to send
    #[arg(long, default_value_t = 20_000)]
    requests: usize,

    /// Bucket capacity
    #[arg(long, default_value_t = 1_000)]
    capacity: u64,

    /// Allow `capacity` requests per this window instead of using `--rate`
    #[arg(long, value_parser = humantime::parse_duration)]
    window: Option<Duration>,

    /// Tokens per second
    #[arg(long, default_value_t = 1_000.0)]
    rate: f64,

    /// Simulated downstream latency
    #[arg(long, default_value = "5ms", value_parser = humantime::parse_duration)]
    latency: Duration,
}

async fn run_load_test<S>(name: &str, svc: S, total_reqs: usize) -> Result<(), BoxError>
where
    S: Service<Request<String>, Response = Response<String>, Error = Infallible>
        + Clone
        + Send
        + 'static,
    S::Future: Send,
{
    let mut hist_admitted = Histogram::<u64>::new_with_bounds(1, 60_000_000, 3)?;
    let mut hist_rejected = Histogram::<u64>::new_with_bounds(1, 60_000_000, 3)?;

    let mut tasks = JoinSet::new();
    let barrier = Arc::new(Barrier::new(total_reqs));
    let start = Instant::now();

    for _ in 0..total_reqs {
        let local_svc = svc.clone();
        let bar = barrier.clone();
        tasks.spawn(async move {
            bar.wait().await;
            let req_start = Instant::now();
            let res = local_svc.oneshot(Request::new(String::new())).await;
            (res, req_start.elapsed())
        });
    }

    let mut admitted = 0;
    let mut rejected = 0;

    while let Some(task) = tasks.join_next().await {
        let (res, elapsed) = task?;
        let response = res?;
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            rejected += 1;
            hist_rejected.record(elapsed.as_micros() as u64)?;
        } else {
            admitted += 1;
            hist_admitted.record(elapsed.as_micros() as u64)?;
        }
    }

    let total_duration = start.elapsed();

    println!("--- {} ---", name);
    println!("Total Duration:  {:.2?}", total_duration);
    println!("Admitted/Total:  {}/{}", admitted, total_reqs);
    println!("Rejected:        {}", rejected);
    println!(
        "Total Rate:      {:.2} req/sec",
        total_reqs as f64 / total_duration.as_secs_f64()
    );
    if admitted > 0 {
        println!("P50 (Admitted):  {}µs", hist_admitted.value_at_quantile(0.5));
        println!("P99 (Admitted):  {}µs", hist_admitted.value_at_quantile(0.99));
    }
    if rejected > 0 {
        println!("P50 (Rejected):  {}µs", hist_rejected.value_at_quantile(0.5));
        println!("P99 (Rejected):  {}µs", hist_rejected.value_at_quantile(0.99));
    }
    println!();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();

    let latency = args.latency;
    let downstream = service_fn(move |_req: Request<String>| async move {
        sleep(latency).await;
        Ok::<_, Infallible>(Response::new("success".to_string()))
    });

    let (name, limiter) = match args.window {
        Some(window) => (
            format!("{} per {}", args.capacity, humantime::format_duration(window)),
            Limiter::per_window(window, args.capacity),
        ),
        None => (
            format!("{}/sec, burst {}", args.rate, args.capacity),
            Limiter::per_second(args.rate, args.capacity),
        ),
    };

    println!("🚀 Starting Stress Test: {} requests", args.requests);
    let svc = RateLimitLayer::<String, String>::new(Arc::new(limiter)).layer(downstream);
    run_load_test(&name, svc, args.requests).await?;

    println!("🏁 Stress test complete.");
    Ok(())
}
