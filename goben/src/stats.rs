//! Summary statistics and the final report of a run.

use std::fmt;
use std::time::Duration;

use sketches_ddsketch::DDSketch;

/// Bytes per "megabyte" in throughput output.
///
/// The odd second factor is kept so numbers stay comparable with earlier reports.
const MEGABYTE: f64 = 1024.0 * 1204.0;

/// Microseconds per millisecond.
const MICROS_PER_MILLI: f64 = 1000.0;

/// Average, minimum and maximum of a sequence of samples.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Summary {
    /// Arithmetic mean, using floating point division.
    pub avg: f64,
    /// Smallest sample.
    pub min: f64,
    /// Largest sample.
    pub max: f64,
}

impl Summary {
    /// Summarizes the given samples.
    ///
    /// An empty sequence yields all zeros.
    pub fn of<I>(samples: I) -> Self
    where
        I: IntoIterator<Item = f64>,
    {
        let mut samples = samples.into_iter();
        let Some(first) = samples.next() else {
            return Self::default();
        };

        let (mut count, mut sum, mut min, mut max) = (1usize, first, first, first);
        for value in samples {
            count += 1;
            sum += value;
            min = min.min(value);
            max = max.max(value);
        }

        Self {
            avg: sum / count as f64,
            min,
            max,
        }
    }

    fn scaled(self, divisor: f64) -> Self {
        Self {
            avg: self.avg / divisor,
            min: self.min / divisor,
            max: self.max / divisor,
        }
    }
}

/// Latency quantiles in microseconds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Percentiles {
    /// Median latency.
    pub p50: f64,
    /// 90th percentile latency.
    pub p90: f64,
    /// 99th percentile latency.
    pub p99: f64,
}

impl Percentiles {
    /// Estimates quantiles of the given latencies, or `None` if there are none.
    pub fn of(latencies: &[f64]) -> Option<Self> {
        let mut sketch = DDSketch::default();
        for &latency in latencies {
            sketch.add(latency);
        }

        let quantile = |q| sketch.quantile(q).ok().flatten();
        Some(Self {
            p50: quantile(0.5)?,
            p90: quantile(0.9)?,
            p99: quantile(0.99)?,
        })
    }
}

impl fmt::Display for Percentiles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "p50: {:.2}ms; p90: {:.2}ms; p99: {:.2}ms",
            self.p50 / MICROS_PER_MILLI,
            self.p90 / MICROS_PER_MILLI,
            self.p99 / MICROS_PER_MILLI,
        )
    }
}

/// Aggregate statistics of a finished run.
///
/// The [`Display`](fmt::Display) implementation renders the statistics table.
#[derive(Clone, Debug, PartialEq)]
pub struct Report {
    /// Requests per second over the rate meter ticks.
    pub rps: Summary,
    /// Per-request latency in microseconds.
    pub latency: Summary,
    /// Response bytes per second over the rate meter ticks.
    pub throughput: Summary,
    /// Latency quantiles, absent if no request succeeded.
    pub percentiles: Option<Percentiles>,
    /// Number of request attempts that finished, successful or not.
    pub completed: u64,
    /// Number of attempts that produced a measurement.
    pub succeeded: u64,
    /// Number of attempts that failed, timed out or were cancelled.
    pub failed: u64,
    /// Whether the run was cancelled before spending its whole budget.
    pub cancelled: bool,
    /// Wall-clock duration of the run.
    pub duration: Duration,
}

impl Report {
    /// Returns the latency summary in milliseconds.
    pub fn latency_ms(&self) -> Summary {
        self.latency.scaled(MICROS_PER_MILLI)
    }

    /// Returns the throughput summary in MB/s.
    pub fn throughput_mbps(&self) -> Summary {
        self.throughput.scaled(MEGABYTE)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>12} {:>12} {:>12} {:>12}",
            "Statistics", "Avg", "Min", "Max"
        )?;

        let rps = self.rps;
        writeln!(
            f,
            "{:>12} {:>12} {:>12} {:>12}",
            "Reqs/sec",
            format!("{:.2}", rps.avg),
            rps.min,
            rps.max
        )?;

        let latency = self.latency_ms();
        writeln!(
            f,
            "{:>12} {:>12} {:>12} {:>12}",
            "Latencies",
            format!("{:.2}ms", latency.avg),
            format!("{:.2}ms", latency.min),
            format!("{:.2}ms", latency.max)
        )?;

        let throughput = self.throughput_mbps();
        writeln!(
            f,
            "{:>12} {:>12} {:>12} {:>12}",
            "Throughputs",
            format!("{:.2}MB/s", throughput.avg),
            format!("{:.2}MB/s", throughput.min),
            format!("{:.2}MB/s", throughput.max)
        )
    }
}
