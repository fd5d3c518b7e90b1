use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Severity of a log line.
///
/// Ordered from least to most severe. `NoLevel` sorts above every real level
/// so it always passes minimum-level filtering and renders as `---`.
/// `Disabled` is a sentinel: a logger forced to it, or configured with it as
/// the minimum, emits nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum Level {
    Trace = 0,
    Debug = 1,
    #[default]
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
    Panic = 6,
    NoLevel = 7,
    Disabled = 8,
}

impl Level {
    pub const ALL: [Level; 8] = [
        Level::Trace,
        Level::Debug,
        Level::Info,
        Level::Warn,
        Level::Error,
        Level::Fatal,
        Level::Panic,
        Level::NoLevel,
    ];

    /// Fixed-width console code.
    pub const fn code(self) -> &'static str {
        match self {
            Level::Trace => "TRC",
            Level::Debug => "DBG",
            Level::Info => "INF",
            Level::Warn => "WRN",
            Level::Error => "ERR",
            Level::Fatal => "FTL",
            Level::Panic => "PNC",
            Level::NoLevel | Level::Disabled => "---",
        }
    }

    /// Lowercase name used in JSON output and configuration.
    pub const fn name(self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
            Level::Panic => "panic",
            Level::NoLevel => "---",
            Level::Disabled => "disabled",
        }
    }

    /// Parses a level, returning `default` for anything unrecognized.
    pub fn parse_or(s: &str, default: Level) -> Level {
        s.parse().unwrap_or(default)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Level {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let level = match s.trim().to_ascii_lowercase().as_str() {
            "trace" | "trc" => Level::Trace,
            "debug" | "dbg" => Level::Debug,
            "info" | "inf" | "" => Level::Info,
            "warn" | "warning" | "wrn" => Level::Warn,
            "error" | "err" => Level::Error,
            "fatal" | "ftl" => Level::Fatal,
            "panic" | "pnc" => Level::Panic,
            "none" | "nolevel" | "---" => Level::NoLevel,
            "disabled" | "off" => Level::Disabled,
            other => return Err(Error::Config(format!("unknown level {other:?}"))),
        };
        Ok(level)
    }
}

impl From<log::Level> for Level {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Trace => Level::Trace,
            log::Level::Debug => Level::Debug,
            log::Level::Info => Level::Info,
            log::Level::Warn => Level::Warn,
            log::Level::Error => Level::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_three_letters() {
        for level in Level::ALL {
            assert_eq!(level.code().len(), 3);
        }
    }

    #[test]
    fn test_parse() {
        assert_eq!("WARN".parse::<Level>().unwrap(), Level::Warn);
        assert_eq!("dbg".parse::<Level>().unwrap(), Level::Debug);
        assert_eq!(" off ".parse::<Level>().unwrap(), Level::Disabled);
        assert!("loud".parse::<Level>().is_err());
        assert_eq!(Level::parse_or("loud", Level::Info), Level::Info);
    }

    #[test]
    fn test_ordering() {
        assert!(Level::Trace < Level::Info);
        assert!(Level::Panic < Level::NoLevel);
        assert!(Level::NoLevel < Level::Disabled);
    }
}
