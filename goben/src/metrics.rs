//! Live measurements shared between the connections and the rate meter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::http::Sample;

/// Cumulative counts since the last rate meter tick.
#[derive(Debug)]
struct IntervalCounters {
    requests: u64,
    bytes: u64,
    last_tick: Instant,
}

/// Counts drained from the interval counters at a tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Interval {
    /// Successful requests since the previous tick.
    pub requests: u64,
    /// Response bytes received since the previous tick.
    pub bytes: u64,
    /// Wall-clock time since the previous tick.
    pub elapsed: Duration,
}

/// Mutable state recorded by every connection while a run is in progress.
///
/// The interval counters and the latency list are guarded by separate locks, so the rate
/// meter never contends with latency appends.
#[derive(Debug)]
pub struct LiveMetrics {
    interval: Mutex<IntervalCounters>,
    latencies: Mutex<Vec<f64>>,
    failures: AtomicU64,
}

impl LiveMetrics {
    /// Creates empty metrics whose first interval starts now.
    pub fn new() -> Self {
        Self {
            interval: Mutex::new(IntervalCounters {
                requests: 0,
                bytes: 0,
                last_tick: Instant::now(),
            }),
            latencies: Mutex::new(Vec::new()),
            failures: AtomicU64::new(0),
        }
    }

    /// Records the outcome of one request attempt.
    ///
    /// Failed attempts only bump the failure count. They contribute neither latency nor
    /// throughput.
    pub fn record(&self, sample: &Sample) {
        match *sample {
            Sample::Success { latency, bytes } => {
                {
                    let mut interval = lock(&self.interval);
                    interval.requests += 1;
                    interval.bytes += bytes;
                }
                lock(&self.latencies).push(latency.as_nanos() as f64 / 1000.0);
            }
            Sample::Failure(_) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Swaps the interval counters to zero and returns what they held.
    ///
    /// The swap and the time measurement happen under the same lock.
    pub fn take_interval(&self) -> Interval {
        let mut interval = lock(&self.interval);
        let now = Instant::now();

        let taken = Interval {
            requests: std::mem::take(&mut interval.requests),
            bytes: std::mem::take(&mut interval.bytes),
            elapsed: now.duration_since(interval.last_tick),
        };
        interval.last_tick = now;

        taken
    }

    /// Returns the number of failed attempts so far.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Takes all latencies recorded so far, in microseconds.
    pub fn take_latencies(&self) -> Vec<f64> {
        std::mem::take(&mut *lock(&self.latencies))
    }
}

impl Default for LiveMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // The guarded data are plain counters, which stay meaningful after a panic.
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use crate::http::RequestError;

    use super::*;

    fn success(micros: u64, bytes: u64) -> Sample {
        Sample::Success {
            latency: Duration::from_micros(micros),
            bytes,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn interval_resets_on_take() {
        let metrics = LiveMetrics::new();
        metrics.record(&success(1500, 10));
        metrics.record(&success(2500, 20));

        tokio::time::advance(Duration::from_millis(100)).await;

        let interval = metrics.take_interval();
        assert_eq!(
            interval,
            Interval {
                requests: 2,
                bytes: 30,
                elapsed: Duration::from_millis(100),
            }
        );

        tokio::time::advance(Duration::from_millis(50)).await;

        let interval = metrics.take_interval();
        assert_eq!(interval.requests, 0);
        assert_eq!(interval.bytes, 0);
        assert_eq!(interval.elapsed, Duration::from_millis(50));
    }

    #[test]
    fn failures_do_not_count_as_requests() {
        let metrics = LiveMetrics::new();
        metrics.record(&Sample::Failure(RequestError::Cancelled));
        metrics.record(&success(1000, 1));

        assert_eq!(metrics.failures(), 1);
        assert_eq!(metrics.take_interval().requests, 1);
        assert_eq!(metrics.take_latencies(), vec![1000.0]);
    }

    #[test]
    fn latencies_are_microseconds() {
        let metrics = LiveMetrics::new();
        metrics.record(&Sample::Success {
            latency: Duration::from_nanos(2_500_500),
            bytes: 0,
        });

        assert_eq!(metrics.take_latencies(), vec![2500.5]);
        assert!(metrics.take_latencies().is_empty());
    }
}
