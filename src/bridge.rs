//! Routes records from the `log` facade into a [`Logger`].
//!
//! ```no_run
//! use linelog::{bridge, Config, Logger, Output};
//!
//! let logger = Logger::new(&Config::default(), Output::stderr());
//! bridge::install(logger, log::LevelFilter::Info).unwrap();
//! log::info!(target: "db", "connected");
//! ```

use crate::error::Result;
use crate::level::Level;
use crate::logger::Logger;
use crate::value::Value;

/// A `log::Log` implementation writing through a [`Logger`]. The record's
/// target becomes a `target` field.
#[derive(Debug, Clone)]
pub struct LogBridge {
    logger: Logger,
}

impl LogBridge {
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }
}

impl log::Log for LogBridge {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        self.logger.enabled(Level::from(metadata.level()))
    }

    fn log(&self, record: &log::Record<'_>) {
        let level = Level::from(record.level());
        if !self.logger.enabled(level) {
            return;
        }
        let fields = [Value::from("target"), Value::from(record.target())];
        self.logger.log_fmt(level, *record.args(), &fields);
    }

    fn flush(&self) {
        let _ = self.logger.output().flush();
    }
}

/// Installs `logger` as the global `log` logger with `max` as the level cap.
pub fn install(logger: Logger, max: log::LevelFilter) -> Result<()> {
    log::set_boxed_logger(Box::new(LogBridge::new(logger)))?;
    log::set_max_level(max);
    Ok(())
}
