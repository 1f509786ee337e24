//! Runs a fixed budget of requests over a pool of concurrent connections.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use indicatif::ProgressBar;
use reqwest::redirect::Policy;
use reqwest::{Client, Url};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::http::RequestExecutor;
use crate::jobs::{CompletionBarrier, JobDispenser};
use crate::meter::RateMeter;
use crate::metrics::LiveMetrics;
use crate::stats::{Percentiles, Report, Summary};

/// Timeout for a single request, including draining its body.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// A builder for creating an [`Engine`].
pub struct EngineBuilder {
    url: String,
    requests: u32,
    concurrency: u16,
    timeout: Duration,
    progress: ProgressBar,
}

impl EngineBuilder {
    /// The total number of requests to send.
    pub fn requests(mut self, requests: u32) -> Self {
        self.requests = requests;
        self
    }

    /// The number of connections sending requests concurrently.
    pub fn concurrency(mut self, concurrency: u16) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// The timeout for each request.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// A progress bar that is advanced once per finished request.
    ///
    /// Its length is set to the request budget when a run starts.
    pub fn progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Validates the configuration and creates the engine.
    pub fn build(self) -> Result<Engine> {
        let url = parse_url(&self.url)?;
        if self.concurrency == 0 {
            return Err(Error::ZeroConcurrency);
        }

        // Each ticket is exactly one GET, so a redirect counts as a failed attempt.
        let client = Client::builder()
            .redirect(Policy::none())
            .pool_max_idle_per_host(usize::from(self.concurrency))
            .connect_timeout(self.timeout)
            .build()
            .map_err(Error::Client)?;

        Ok(Engine {
            requests: self.requests,
            concurrency: self.concurrency,
            executor: RequestExecutor::new(client, url, self.timeout),
            progress: self.progress,
        })
    }
}

impl fmt::Debug for EngineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("url", &self.url)
            .field("requests", &self.requests)
            .field("concurrency", &self.concurrency)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

fn parse_url(url: &str) -> Result<Url> {
    let invalid = |reason: &str| Error::InvalidUrl {
        url: url.to_owned(),
        reason: reason.to_owned(),
    };

    if url.trim().is_empty() {
        return Err(invalid("url is empty"));
    }

    let parsed = Url::parse(url).map_err(|err| invalid(&err.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(invalid(&format!("unsupported scheme `{scheme}`"))),
    }
}

/// A load generator for a single target URL.
///
/// Configuration is fixed at construction. Every call to [`run`](Self::run) spends the full
/// request budget with fresh counters.
pub struct Engine {
    requests: u32,
    concurrency: u16,
    executor: RequestExecutor,
    progress: ProgressBar,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("requests", &self.requests)
            .field("concurrency", &self.concurrency)
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}

/// State shared by all connections of one run.
struct RunState {
    jobs: JobDispenser,
    barrier: CompletionBarrier,
    metrics: Arc<LiveMetrics>,
    executor: RequestExecutor,
    progress: ProgressBar,
    cancel: CancellationToken,
}

impl Engine {
    /// Creates an engine sending `requests` requests to `url` over `concurrency` connections.
    pub fn new(requests: u32, concurrency: u16, url: impl Into<String>) -> Result<Self> {
        Self::builder(url)
            .requests(requests)
            .concurrency(concurrency)
            .build()
    }

    /// Constructs a new engine builder for the given target URL.
    pub fn builder(url: impl Into<String>) -> EngineBuilder {
        EngineBuilder {
            url: url.into(),
            requests: 100_000,
            concurrency: 100,
            timeout: DEFAULT_TIMEOUT,
            progress: ProgressBar::hidden(),
        }
    }

    /// The total number of requests per run.
    pub fn requests(&self) -> u32 {
        self.requests
    }

    /// The number of concurrent connections.
    pub fn concurrency(&self) -> u16 {
        self.concurrency
    }

    /// The target URL.
    pub fn url(&self) -> &Url {
        self.executor.url()
    }

    /// Runs the benchmark and prints the statistics table to stdout.
    pub async fn run(&self) -> Result<Report> {
        self.run_until(CancellationToken::new()).await
    }

    /// Like [`run`](Self::run), but stops early once `cancel` is triggered.
    ///
    /// A cancelled run stops handing out requests, aborts the ones in flight and still reports
    /// what was measured up to that point.
    pub async fn run_until(&self, cancel: CancellationToken) -> Result<Report> {
        let report = self.execute(cancel).await?;
        print!("{report}");
        Ok(report)
    }

    async fn execute(&self, cancel: CancellationToken) -> Result<Report> {
        self.execute_with(cancel, connection).await
    }

    async fn execute_with<F, Fut>(
        &self,
        cancel: CancellationToken,
        connection: F,
    ) -> Result<Report>
    where
        F: Fn(Arc<RunState>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        tracing::info!(
            url = %self.url(),
            requests = self.requests,
            concurrency = self.concurrency,
            "starting benchmark"
        );
        let start = Instant::now();

        self.progress.set_length(u64::from(self.requests));
        self.progress.set_position(0);

        // Cancelled by the caller, or by us if a connection dies.
        let run_cancel = cancel.child_token();
        let metrics = Arc::new(LiveMetrics::new());
        let state = Arc::new(RunState {
            jobs: JobDispenser::new(self.requests, run_cancel.clone()),
            barrier: CompletionBarrier::new(self.requests),
            metrics: Arc::clone(&metrics),
            executor: self.executor.clone(),
            progress: self.progress.clone(),
            cancel: run_cancel,
        });

        let meter = RateMeter::new(Arc::clone(&metrics)).spawn();
        let workers: Vec<_> = (0..self.concurrency)
            .map(|_| tokio::spawn(connection(Arc::clone(&state))))
            .collect();

        let workers = futures_util::future::try_join_all(workers);
        tokio::pin!(workers);

        // Connections only exit on their own before the barrier opens if one of them died.
        let early_exit = tokio::select! {
            _ = state.barrier.wait() => None,
            _ = cancel.cancelled() => {
                tracing::info!("benchmark cancelled, waiting for requests in flight");
                None
            }
            result = &mut workers => Some(result),
        };

        let joined = match early_exit {
            Some(result) => result,
            None => workers.await,
        };
        self.progress.finish_and_clear();

        // Stop the meter before bailing, so it does not outlive the run.
        let rates = meter.stop().await;
        if let Err(err) = joined {
            state.cancel.cancel();
            tracing::error!("connection failed: {err}");
            return Err(err.into());
        }
        let rates = rates?;

        let completed = state.barrier.completed();
        if completed < u64::from(self.requests) && !cancel.is_cancelled() {
            return Err(Error::Internal(format!(
                "connections exited after {completed} of {} requests",
                self.requests
            )));
        }

        let latencies = metrics.take_latencies();
        let report = Report {
            rps: Summary::of(rates.rps.iter().map(|&rps| rps as f64)),
            latency: Summary::of(latencies.iter().copied()),
            throughput: Summary::of(rates.throughput.iter().copied()),
            percentiles: Percentiles::of(&latencies),
            completed,
            succeeded: latencies.len() as u64,
            failed: metrics.failures(),
            cancelled: cancel.is_cancelled(),
            duration: start.elapsed(),
        };

        tracing::info!(
            completed = report.completed,
            failed = report.failed,
            duration = ?report.duration,
            "benchmark finished"
        );

        Ok(report)
    }
}

/// One connection: sends requests until the budget is spent.
async fn connection(state: Arc<RunState>) {
    while state.jobs.try_acquire() {
        let sample = state.executor.execute(&state.cancel).await;
        state.metrics.record(&sample);
        state.barrier.signal();
        state.progress.inc(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_url() {
        let err = Engine::new(10, 1, "").unwrap_err();
        assert!(matches!(err, Error::InvalidUrl { .. }), "{err}");
    }

    #[test]
    fn rejects_malformed_url() {
        let err = Engine::new(10, 1, "not a url").unwrap_err();
        assert!(matches!(err, Error::InvalidUrl { .. }), "{err}");
    }

    #[test]
    fn rejects_unsupported_scheme() {
        let err = Engine::new(10, 1, "ftp://localhost/file").unwrap_err();
        let Error::InvalidUrl { url, reason } = err else {
            panic!("expected invalid url error");
        };
        assert_eq!(url, "ftp://localhost/file");
        assert!(reason.contains("ftp"));
    }

    #[test]
    fn rejects_zero_concurrency() {
        let err = Engine::new(10, 0, "http://localhost/").unwrap_err();
        assert!(matches!(err, Error::ZeroConcurrency));
    }

    #[test]
    fn builder_applies_settings() {
        let engine = Engine::builder("http://localhost:8080/ping")
            .requests(42)
            .concurrency(7)
            .timeout(Duration::from_secs(1))
            .build()
            .unwrap();

        assert_eq!(engine.requests(), 42);
        assert_eq!(engine.concurrency(), 7);
        assert_eq!(engine.url().as_str(), "http://localhost:8080/ping");
    }

    #[tokio::test]
    async fn empty_budget_finishes_immediately() {
        let engine = Engine::new(0, 4, "http://127.0.0.1:9/").unwrap();
        let report = engine.run().await.unwrap();

        assert_eq!(report.completed, 0);
        assert_eq!(report.rps, Summary::default());
        assert_eq!(report.latency, Summary::default());
        assert_eq!(report.percentiles, None);
    }

    #[tokio::test]
    async fn refused_connections_count_as_failures() {
        // Bind and drop a listener to get a port nothing listens on.
        let addr = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();

        let engine = Engine::builder(format!("http://{addr}/"))
            .requests(20)
            .concurrency(4)
            .timeout(Duration::from_secs(2))
            .build()
            .unwrap();
        let report = engine.run().await.unwrap();

        assert_eq!(report.completed, 20);
        assert_eq!(report.failed, 20);
        assert_eq!(report.succeeded, 0);
        assert_eq!(report.throughput, Summary::default());
    }

    #[tokio::test]
    async fn dead_connection_aborts_run() {
        let engine = Engine::new(10, 2, "http://127.0.0.1:9/").unwrap();

        let result = engine
            .execute_with(CancellationToken::new(), |state| async move {
                if state.jobs.try_acquire() {
                    panic!("connection died");
                }
            })
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, Error::Internal(_)), "{err}");
    }

    #[tokio::test]
    async fn unsignaled_tickets_abort_run() {
        let engine = Engine::new(10, 2, "http://127.0.0.1:9/").unwrap();

        // Takes every ticket without ever reporting a completion.
        let result = engine
            .execute_with(CancellationToken::new(), |state| async move {
                while state.jobs.try_acquire() {}
            })
            .await;

        let Err(Error::Internal(message)) = result else {
            panic!("expected internal error, got {result:?}");
        };
        assert!(message.contains("0 of 10"), "{message}");
    }
}
