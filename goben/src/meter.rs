//! Periodic sampling of request rate and throughput.
//!
//! The [`RateMeter`] wakes up every [`TICK_INTERVAL`], drains the interval counters of
//! [`LiveMetrics`] and turns them into one requests/sec and one bytes/sec sample. It owns the
//! sample sequences while it runs and hands them back only once it has stopped, so they can
//! never be read while the meter still appends to them.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::error::Result;
use crate::metrics::{Interval, LiveMetrics};

/// Time between two rate samples.
pub const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Per-tick rate samples collected over a run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RateSamples {
    /// Requests per second, truncated to whole requests.
    pub rps: Vec<u64>,
    /// Response bytes per second.
    pub throughput: Vec<f64>,
}

impl RateSamples {
    /// Converts one drained interval into rate samples.
    ///
    /// Rates below one per second are dropped, which filters out idle ticks such as the one
    /// right after the last request finished.
    pub fn record(&mut self, interval: Interval) {
        let seconds = interval.elapsed.as_secs_f64();
        if seconds <= 0.0 {
            return;
        }

        let rps = (interval.requests as f64 / seconds) as u64;
        let throughput = interval.bytes as f64 / seconds;
        tracing::trace!(rps, throughput, "rate meter tick");

        if rps >= 1 {
            self.rps.push(rps);
        }
        if throughput >= 1.0 {
            self.throughput.push(throughput);
        }
    }
}

/// Samples the live metrics on a fixed tick until stopped.
#[derive(Debug)]
pub struct RateMeter {
    metrics: Arc<LiveMetrics>,
    period: Duration,
}

impl RateMeter {
    /// Creates a meter ticking every [`TICK_INTERVAL`].
    pub fn new(metrics: Arc<LiveMetrics>) -> Self {
        Self {
            metrics,
            period: TICK_INTERVAL,
        }
    }

    /// Starts the meter on the current runtime.
    pub fn spawn(self) -> RateMeterHandle {
        let (stop, stopped) = oneshot::channel();
        let task = tokio::spawn(self.run(stopped));
        RateMeterHandle { stop, task }
    }

    async fn run(self, mut stop: oneshot::Receiver<()>) -> RateSamples {
        let mut samples = RateSamples::default();

        let mut ticker = tokio::time::interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => samples.record(self.metrics.take_interval()),
                // A dropped handle stops the meter just like an explicit stop.
                _ = &mut stop => break,
            }
        }

        // The final partial interval.
        samples.record(self.metrics.take_interval());
        samples
    }
}

/// Handle to a running [`RateMeter`].
#[derive(Debug)]
pub struct RateMeterHandle {
    stop: oneshot::Sender<()>,
    task: JoinHandle<RateSamples>,
}

impl RateMeterHandle {
    /// Stops the meter and waits until it has taken its final sample.
    ///
    /// Returns the collected samples once the meter task has fully exited.
    pub async fn stop(self) -> Result<RateSamples> {
        // The receiver only goes away when the task is gone, which the join below reports.
        let _ = self.stop.send(());
        Ok(self.task.await?)
    }
}
