//! Configuration for the `goben` binary.
//!
//! Configuration can be loaded from multiple sources with the following precedence (highest to
//! lowest):
//!
//! 1. Command line flags
//! 2. Environment variables (prefixed with `GOBEN__`)
//! 3. YAML configuration file (specified via the `--config` flag)
//! 4. Defaults
//!
//! # Environment Variables
//!
//! Environment variables use `GOBEN__` as a prefix and double underscores (`__`) to denote nested
//! configuration structures. For example:
//!
//! - `GOBEN__URL=http://localhost:8080/` sets the target URL
//! - `GOBEN__TIMEOUT=2s` sets the request timeout
//! - `GOBEN__LOGGING__LEVEL=debug` sets the log level
//!
//! # YAML Configuration File
//!
//! ```yaml
//! url: http://localhost:8080/
//! requests: 10000
//! connections: 50
//! timeout: 2s
//!
//! logging:
//!   level: debug
//!   format: json
//! ```

use std::fmt;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

use crate::engine::DEFAULT_TIMEOUT;

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "GOBEN__";

/// Log output format.
///
/// Logs are always written to stderr, so they never mix with the report on stdout.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect the best format.
    ///
    /// This chooses [`LogFormat::Pretty`] for TTY, otherwise [`LogFormat::Simplified`].
    Auto,

    /// Pretty printing with colors.
    Pretty,

    /// Simplified plain text output.
    Simplified,

    /// Dump out JSON lines.
    Json,
}

/// The logging format parse error.
#[derive(Clone, Debug)]
pub struct FormatParseError(String);

impl fmt::Display for FormatParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            r#"error parsing "{}" as format: expected one of "auto", "pretty", "simplified", "json""#,
            self.0
        )
    }
}

impl std::error::Error for FormatParseError {}

impl std::str::FromStr for LogFormat {
    type Err = FormatParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let result = match s {
            "" => LogFormat::Auto,
            s if s.eq_ignore_ascii_case("auto") => LogFormat::Auto,
            s if s.eq_ignore_ascii_case("pretty") => LogFormat::Pretty,
            s if s.eq_ignore_ascii_case("simplified") => LogFormat::Simplified,
            s if s.eq_ignore_ascii_case("json") => LogFormat::Json,
            s => return Err(FormatParseError(s.into())),
        };

        Ok(result)
    }
}

mod display_fromstr {
    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
        T: std::fmt::Display,
    {
        serializer.collect_str(&value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        D: serde::Deserializer<'de>,
        T: std::str::FromStr,
        <T as std::str::FromStr>::Err: std::fmt::Display,
    {
        use serde::Deserialize;
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Logging configuration.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Logging {
    /// Minimum log level to output.
    ///
    /// The `RUST_LOG` environment variable takes precedence if set.
    ///
    /// # Default
    ///
    /// `WARN`, so that logs stay out of the way of the report.
    ///
    /// # Environment Variable
    ///
    /// `GOBEN__LOGGING__LEVEL`
    #[serde(with = "display_fromstr")]
    pub level: LevelFilter,

    /// Log output format.
    ///
    /// # Default
    ///
    /// `Auto` (pretty for TTY, simplified otherwise)
    ///
    /// # Environment Variable
    ///
    /// `GOBEN__LOGGING__FORMAT`
    pub format: LogFormat,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::WARN,
            format: LogFormat::Auto,
        }
    }
}

/// Main configuration struct of a benchmark run.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// URL that will be benchmarked.
    ///
    /// Must be an `http` or `https` URL. There is no default, so this has to be provided by one
    /// of the sources.
    ///
    /// # Environment Variable
    ///
    /// `GOBEN__URL`
    pub url: String,

    /// Total number of requests to send.
    ///
    /// # Default
    ///
    /// `100000`
    ///
    /// # Environment Variable
    ///
    /// `GOBEN__REQUESTS`
    pub requests: u32,

    /// Number of concurrent connections.
    ///
    /// # Default
    ///
    /// `100`
    ///
    /// # Environment Variable
    ///
    /// `GOBEN__CONNECTIONS`
    pub connections: u16,

    /// Timeout for a single request, including reading the response body.
    ///
    /// # Default
    ///
    /// `10s`
    ///
    /// # Environment Variable
    ///
    /// `GOBEN__TIMEOUT`
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Whether to show a progress bar while the benchmark runs.
    ///
    /// The bar is drawn on stderr and only if it is a terminal.
    ///
    /// # Default
    ///
    /// `true`
    ///
    /// # Environment Variable
    ///
    /// `GOBEN__PROGRESS`
    pub progress: bool,

    /// Logging configuration.
    pub logging: Logging,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: String::new(),
            requests: 100_000,
            connections: 100,
            timeout: DEFAULT_TIMEOUT,
            progress: true,
            logging: Logging::default(),
        }
    }
}

impl Config {
    /// Loads configuration from an optional YAML file and the environment.
    ///
    /// Configuration is merged in the following order (later sources override earlier ones):
    /// 1. Default values
    /// 2. YAML configuration file (if provided)
    /// 3. Environment variables (prefixed with `GOBEN__`)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = figment::Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        Ok(config)
    }
}
