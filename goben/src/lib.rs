//! A fixed-budget HTTP load generator.
//!
//! An [`Engine`] sends a given total number of GET requests to a single URL over a given number
//! of concurrent connections, and summarizes the run as requests per second, latency and
//! throughput.
//!
//! Each connection takes tickets from a shared [`JobDispenser`](jobs::JobDispenser) until the
//! budget is spent. Every finished attempt is recorded into the live metrics and signaled to a
//! [`CompletionBarrier`](jobs::CompletionBarrier). Meanwhile, a [`RateMeter`](meter::RateMeter)
//! samples the request rate and throughput every 100ms. Once the barrier opens, the meter takes
//! a final sample and the [`Report`] is computed.
//!
//! ```no_run
//! # async fn bench() -> goben::Result<()> {
//! let engine = goben::Engine::new(10_000, 50, "http://localhost:8080/")?;
//! let report = engine.run().await?;
//! assert_eq!(report.completed, 10_000);
//! # Ok(())
//! # }
//! ```
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod jobs;
pub mod meter;
pub mod metrics;
pub mod observability;
pub mod stats;

pub use crate::engine::{Engine, EngineBuilder};
pub use crate::error::{Error, Result};
pub use crate::stats::Report;
