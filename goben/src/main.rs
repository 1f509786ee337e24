//! Command line interface for the `goben` HTTP load generator.
//!
//! ```text
//! goben run -u http://localhost:8080/ -n 100000 -c 100
//! ```
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

mod cli;

fn main() -> anyhow::Result<()> {
    cli::execute()
}
