use std::time::{Duration, Instant};

use goben::Engine;
use goben::stats::Summary;
use goben_test::server::{SLOW_DELAY, TestServer};
use tokio_util::sync::CancellationToken;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn completes_full_budget() {
    goben_test::tracing::init();
    let server = TestServer::new().await;

    let engine = Engine::new(50, 5, server.url("/ok")).unwrap();
    let report = engine.run().await.unwrap();

    assert_eq!(report.completed, 50);
    assert_eq!(report.succeeded, 50);
    assert_eq!(report.failed, 0);
    assert!(!report.cancelled);
    assert_eq!(server.hits(), 50);

    assert!(report.rps.avg > 0.0);
    assert!(report.rps.min <= report.rps.max);
    assert!(report.latency.min >= 0.0);
    assert!(report.latency.min <= report.latency.avg);
    assert!(report.latency.avg <= report.latency.max);
    assert!(report.throughput.avg > 0.0);
    assert!(report.percentiles.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn more_connections_than_requests() {
    let server = TestServer::new().await;

    let engine = Engine::new(3, 16, server.url("/ok")).unwrap();
    let report = engine.run().await.unwrap();

    assert_eq!(report.completed, 3);
    assert_eq!(report.succeeded, 3);
    assert_eq!(server.hits(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn measures_slow_responses() {
    let server = TestServer::new().await;

    let engine = Engine::new(40, 8, server.url("/slow")).unwrap();
    let report = engine.run().await.unwrap();

    assert_eq!(report.completed, 40);
    assert_eq!(report.succeeded, 40);

    // Latencies are kept in microseconds.
    let min_latency = SLOW_DELAY.as_micros() as f64;
    assert!(report.latency.min >= min_latency, "{:?}", report.latency);
    assert!(report.latency_ms().min >= SLOW_DELAY.as_millis() as f64);
    assert!(report.duration >= SLOW_DELAY * 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn timeouts_do_not_hang() {
    goben_test::tracing::init();
    let server = TestServer::new().await;

    let timeout = Duration::from_millis(200);
    let engine = Engine::builder(server.url("/hang"))
        .requests(10)
        .concurrency(3)
        .timeout(timeout)
        .build()
        .unwrap();

    let start = Instant::now();
    let report = engine.run().await.unwrap();

    assert!(start.elapsed() < timeout * 10);
    assert_eq!(report.completed, 10);
    assert_eq!(report.succeeded, 0);
    assert_eq!(report.failed, 10);
    assert_eq!(report.rps, Summary::default());
    assert_eq!(report.latency, Summary::default());
    assert_eq!(report.throughput, Summary::default());
    assert_eq!(report.percentiles, None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn error_statuses_are_failures() {
    let server = TestServer::new().await;

    let engine = Engine::new(20, 4, server.url("/error")).unwrap();
    let report = engine.run().await.unwrap();

    assert_eq!(report.completed, 20);
    assert_eq!(report.failed, 20);
    assert_eq!(report.latency, Summary::default());
    assert_eq!(server.hits(), 20);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn redirects_are_not_followed() {
    let server = TestServer::new().await;

    let engine = Engine::new(10, 2, server.url("/redirect")).unwrap();
    let report = engine.run().await.unwrap();

    assert_eq!(report.completed, 10);
    assert_eq!(report.succeeded, 0);
    assert_eq!(report.failed, 10);
    // Following the redirect would double the load on the target.
    assert_eq!(server.hits(), 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancellation_stops_run() {
    let server = TestServer::new().await;

    let engine = Engine::builder(server.url("/hang"))
        .requests(100)
        .concurrency(4)
        .build()
        .unwrap();

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            cancel.cancel();
        }
    });

    let start = Instant::now();
    let report = engine.run_until(cancel).await.unwrap();

    // Far below the default request timeout.
    assert!(start.elapsed() < Duration::from_secs(5));
    assert!(report.cancelled);
    assert_eq!(report.completed, 4);
    assert_eq!(report.failed, 4);
    assert_eq!(report.succeeded, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn engine_can_run_repeatedly() {
    let server = TestServer::new().await;

    let engine = Engine::new(25, 5, server.url("/ok")).unwrap();
    let first = engine.run().await.unwrap();
    let second = engine.run().await.unwrap();

    assert_eq!(first.completed, 25);
    assert_eq!(second.completed, 25);
    assert_eq!(second.succeeded, 25);
    assert_eq!(server.hits(), 50);
}
