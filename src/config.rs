use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Deserializer};

use crate::error::{Error, Result};
use crate::level::Level;
use crate::time_cache::DEFAULT_LAYOUT;

/// Line layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Console,
    Json,
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "console" | "text" | "pretty" => Ok(Mode::Console),
            "json" | "structured" => Ok(Mode::Json),
            other => Err(Error::Config(format!("unknown mode {other:?}"))),
        }
    }
}

/// Whether to emit ANSI colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorChoice {
    /// Color when the destination is a terminal.
    #[default]
    Auto,
    Always,
    Never,
}

impl FromStr for ColorChoice {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" | "" => Ok(ColorChoice::Auto),
            "always" | "force" | "on" | "true" | "1" => Ok(ColorChoice::Always),
            "never" | "off" | "false" | "0" | "none" => Ok(ColorChoice::Never),
            other => Err(Error::Config(format!("unknown color choice {other:?}"))),
        }
    }
}

/// How NaN and infinities are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NonFinite {
    /// `"NaN"`, `"+Inf"`, `"-Inf"` (bare in console output).
    #[default]
    String,
    /// `null`.
    Null,
}

impl FromStr for NonFinite {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "string" | "strings" | "quoted" => Ok(NonFinite::String),
            "null" => Ok(NonFinite::Null),
            other => Err(Error::Config(format!("unknown non-finite policy {other:?}"))),
        }
    }
}

/// Logger configuration.
///
/// Every field has a default, and values that fail to parse fall back to
/// that default with a warning instead of failing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(deserialize_with = "lenient")]
    pub mode: Mode,
    #[serde(deserialize_with = "lenient")]
    pub level: Level,
    /// chrono strftime layout for timestamps and time values.
    pub time_layout: String,
    pub utc: bool,
    /// Whether lines start with a timestamp.
    pub timestamp: bool,
    #[serde(deserialize_with = "lenient")]
    pub color: ColorChoice,
    /// Long JSON key names (`time`, `level`, `message`).
    pub verbose_fields: bool,
    #[serde(deserialize_with = "lenient")]
    pub non_finite: NonFinite,
    /// Adds a `loglevel=<name>` field to every line.
    pub loglevel_field: bool,
    pub auto_flush: bool,
    /// Files to append to. More than one tees. Empty means the writer given
    /// at construction.
    pub output: Vec<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::Console,
            level: Level::Info,
            time_layout: DEFAULT_LAYOUT.to_string(),
            utc: false,
            timestamp: true,
            color: ColorChoice::Auto,
            verbose_fields: false,
            non_finite: NonFinite::String,
            loglevel_field: false,
            auto_flush: false,
            output: Vec::new(),
        }
    }
}

fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr + Default,
{
    let raw = String::deserialize(deserializer)?;
    Ok(parse_or_default(&raw))
}

fn parse_or_default<T: FromStr + Default>(raw: &str) -> T {
    raw.parse().unwrap_or_else(|_| {
        tracing::warn!(value = raw, "unrecognized config value, using default");
        T::default()
    })
}

fn no_color_env() -> bool {
    std::env::var_os("NO_COLOR").is_some_and(|v| !v.is_empty())
}

fn parse_bool(raw: &str, default: bool) -> bool {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => {
            tracing::warn!(value = raw, "unrecognized boolean, using default");
            default
        }
    }
}

impl Config {
    /// Reads the `LINELOG_*` environment variables and `NO_COLOR`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`Self::from_env`] with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(v) = lookup("LINELOG_MODE") {
            config.mode = parse_or_default(&v);
        }
        if let Some(v) = lookup("LINELOG_LEVEL") {
            config.level = parse_or_default(&v);
        }
        if let Some(v) = lookup("LINELOG_TIME_FORMAT") {
            config.time_layout = v;
        }
        if let Some(v) = lookup("LINELOG_UTC") {
            config.utc = parse_bool(&v, config.utc);
        }
        if let Some(v) = lookup("LINELOG_TIMESTAMP") {
            config.timestamp = parse_bool(&v, config.timestamp);
        }
        if let Some(v) = lookup("LINELOG_COLOR") {
            config.color = parse_or_default(&v);
        }
        if lookup("NO_COLOR").is_some_and(|v| !v.is_empty()) {
            config.color = ColorChoice::Never;
        }
        if let Some(v) = lookup("LINELOG_VERBOSE") {
            config.verbose_fields = parse_bool(&v, config.verbose_fields);
        }
        if let Some(v) = lookup("LINELOG_NONFINITE") {
            config.non_finite = parse_or_default(&v);
        }
        if let Some(v) = lookup("LINELOG_OUTPUT") {
            config.output = v
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
                .collect();
        }
        config
    }

    /// Parses a JSON configuration document.
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|err| Error::Config(err.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Resolves the color choice for a destination. `Auto` colors a
    /// terminal unless `NO_COLOR` is set to a non-empty value.
    pub fn use_color(&self, is_terminal: bool) -> bool {
        self.color_for(is_terminal, no_color_env())
    }

    fn color_for(&self, is_terminal: bool, no_color: bool) -> bool {
        match self.color {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => is_terminal && !no_color,
        }
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_time_layout(mut self, layout: impl Into<String>) -> Self {
        self.time_layout = layout.into();
        self
    }

    pub fn with_utc(mut self, utc: bool) -> Self {
        self.utc = utc;
        self
    }

    pub fn with_timestamp(mut self, timestamp: bool) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_color(mut self, color: ColorChoice) -> Self {
        self.color = color;
        self
    }

    pub fn with_verbose_fields(mut self, verbose: bool) -> Self {
        self.verbose_fields = verbose;
        self
    }

    pub fn with_non_finite(mut self, policy: NonFinite) -> Self {
        self.non_finite = policy;
        self
    }

    pub fn with_loglevel_field(mut self, enabled: bool) -> Self {
        self.loglevel_field = enabled;
        self
    }

    pub fn with_auto_flush(mut self, enabled: bool) -> Self {
        self.auto_flush = enabled;
        self
    }

    pub fn with_output(mut self, paths: Vec<PathBuf>) -> Self {
        self.output = paths;
        self
    }
}
