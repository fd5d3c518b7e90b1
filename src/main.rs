//! Reads lines from stdin and logs each one.
//!
//! Output is configured from the `LINELOG_*` environment variables. An
//! optional first argument sets the level lines are logged at (default
//! `info`). Diagnostics about the logger itself go to stderr, filtered by
//! `RUST_LOG`.

use std::io::{self, BufRead};
use std::time::Duration;

use linelog::{Config, Level, Logger, Output};
use tracing_subscriber::EnvFilter;

fn main() -> io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let level = std::env::args()
        .nth(1)
        .map(|arg| Level::parse_or(&arg, Level::Info))
        .unwrap_or(Level::Info);

    let config = Config::from_env();
    let logger = Logger::from_config(&config, Output::stdout());

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        logger.log(level, line.trim_end_matches('\r'), &[]);
    }

    logger.output().flush()?;
    logger.close(Duration::from_secs(2));
    Ok(())
}
