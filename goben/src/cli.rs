use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use argh::FromArgs;
use goben::Engine;
use goben::config::Config;
use goben::observability;
use goben::stats::Report;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use yansi::Paint;

/// HTTP benchmarking tool.
#[derive(Debug, FromArgs)]
struct Args {
    /// path to the YAML configuration file
    #[argh(option)]
    pub config: Option<PathBuf>,

    #[argh(subcommand)]
    pub command: Command,
}

#[derive(Debug, FromArgs)]
#[argh(subcommand)]
enum Command {
    Run(RunCommand),
    Version(VersionCommand),
}

/// run a benchmark against a URL
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "run")]
struct RunCommand {
    /// number of requests
    #[argh(option, short = 'n')]
    requests: Option<u32>,

    /// number of connections
    #[argh(option, short = 'c')]
    connections: Option<u16>,

    /// URL that will be benchmarked
    #[argh(option, short = 'u')]
    url: Option<String>,

    /// timeout per request, e.g. `2s` or `500ms`
    #[argh(option, from_str_fn(parse_timeout))]
    timeout: Option<Duration>,

    /// do not show a progress bar
    #[argh(switch)]
    no_progress: bool,
}

impl RunCommand {
    /// Overrides configuration values with the ones given on the command line.
    fn apply(self, config: &mut Config) {
        if let Some(requests) = self.requests {
            config.requests = requests;
        }
        if let Some(connections) = self.connections {
            config.connections = connections;
        }
        if let Some(url) = self.url {
            config.url = url;
        }
        if let Some(timeout) = self.timeout {
            config.timeout = timeout;
        }
        if self.no_progress {
            config.progress = false;
        }
    }
}

/// print the goben version
#[derive(Default, Debug, FromArgs)]
#[argh(subcommand, name = "version")]
struct VersionCommand {}

fn parse_timeout(value: &str) -> Result<Duration, String> {
    humantime::parse_duration(value).map_err(|err| err.to_string())
}

/// Bootstrap the runtime and execute the CLI command.
pub fn execute() -> Result<()> {
    let args: Args = argh::from_env();

    let run = match args.command {
        Command::Version(VersionCommand {}) => {
            println!("goben {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Command::Run(run) => run,
    };

    let mut config = Config::load(args.config.as_deref()).context("failed to load config")?;
    run.apply(&mut config);

    observability::initialize_tracing(&config.logging);
    tracing::debug!(?config);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("goben-rt")
        .enable_all()
        .build()?;

    runtime.block_on(benchmark(config))
}

async fn benchmark(config: Config) -> Result<()> {
    let progress = if config.progress {
        let bar = ProgressBar::new(0)
            .with_style(ProgressStyle::with_template(
                "{spinner} {msg} {wide_bar} {pos}/{len} {elapsed}",
            )?)
            .with_message("Running benchmark:");
        bar.enable_steady_tick(Duration::from_millis(100));
        bar
    } else {
        ProgressBar::hidden()
    };

    let engine = Engine::builder(config.url)
        .requests(config.requests)
        .concurrency(config.connections)
        .timeout(config.timeout)
        .progress(progress)
        .build()
        .context("invalid benchmark configuration")?;

    println!(
        "{} {} ({} requests, {} connections)",
        "## Benchmarking".bold(),
        engine.url().blue(),
        engine.requests().bold(),
        engine.concurrency().bold()
    );

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    let report = engine.run_until(cancel).await?;
    print_details(&report);

    Ok(())
}

fn print_details(report: &Report) {
    println!();
    if let Some(percentiles) = report.percentiles {
        println!("  latency {percentiles}");
    }
    println!(
        "  {} requests in {:.2?}",
        report.completed.bold(),
        report.duration
    );
    if report.failed > 0 {
        println!(
            "  {}",
            format!("{} FAILURES", report.failed).bold().red()
        );
    }
    if report.cancelled {
        println!("  {}", "CANCELLED".bold().yellow());
    }
}
