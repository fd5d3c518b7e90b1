//! The logger and its four rendering variants.
//!
//! A [`Logger`] is an immutable value. Deriving one with [`Logger::with`],
//! [`Logger::with_log_level`] or [`Logger::set_level`] returns a new value
//! and leaves the parent untouched. Derived loggers share the renderer, the
//! output and the timestamp cache of the logger they came from.
//!
//! # Examples
//!
//! ```
//! use linelog::{fields, Config, Level, Logger, Output};
//!
//! let config = Config::default().with_timestamp(false);
//! let log = Logger::new(&config, Output::stderr());
//! let http = log.with(&fields!["component", "http"]);
//! http.info("ready", &fields!["port", 8080]);
//! assert!(!http.enabled(Level::Debug));
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::color::{self, ColorScheme};
use crate::config::{Config, Mode};
use crate::encoder::{Colored, ConsoleEncoder, EncodeOptions, JsonEncoder, LineEncoder, Plain};
use crate::level::Level;
use crate::lifecycle::{self, Context, OwnerToken};
use crate::line_buffer::{self, LineBuffer};
use crate::output::{Output, Target};
use crate::time_cache::{in_zone, system_clock, Clock, TimeCache, TimeLayout};
use crate::value::{pairs, Field, KeyRef, Value};

enum Renderer {
    ConsolePlain(ConsoleEncoder<Plain>),
    ConsoleColor(ConsoleEncoder<Colored>),
    JsonPlain(JsonEncoder<Plain>),
    JsonColor(JsonEncoder<Colored>),
}

macro_rules! dispatch {
    ($renderer:expr, $enc:ident => $body:expr) => {
        match $renderer {
            Renderer::ConsolePlain($enc) => $body,
            Renderer::ConsoleColor($enc) => $body,
            Renderer::JsonPlain($enc) => $body,
            Renderer::JsonColor($enc) => $body,
        }
    };
}

impl Renderer {
    fn new(mode: Mode, color: Option<&dyn ColorScheme>, opts: EncodeOptions) -> Self {
        match (mode, color) {
            (Mode::Console, None) => Renderer::ConsolePlain(ConsoleEncoder::new(Plain, opts)),
            (Mode::Console, Some(scheme)) => {
                Renderer::ConsoleColor(ConsoleEncoder::new(Colored::new(scheme), opts))
            }
            (Mode::Json, None) => Renderer::JsonPlain(JsonEncoder::new(Plain, opts)),
            (Mode::Json, Some(scheme)) => {
                Renderer::JsonColor(JsonEncoder::new(Colored::new(scheme), opts))
            }
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Renderer::ConsolePlain(_) => "console",
            Renderer::ConsoleColor(_) => "console-color",
            Renderer::JsonPlain(_) => "json",
            Renderer::JsonColor(_) => "json-color",
        }
    }
}

/// Where line timestamps come from.
struct TimeSource {
    layout: Arc<TimeLayout>,
    utc: bool,
    clock: Clock,
    cache: Option<Arc<TimeCache>>,
}

impl TimeSource {
    /// Copies the cached text, or formats now when there is no running cache.
    #[inline]
    fn write(&self, buf: &mut LineBuffer) {
        if let Some(cache) = &self.cache {
            if cache.append_current(buf.bytes_mut()) {
                return;
            }
        }
        let now = in_zone((self.clock)(), self.utc);
        buf.push_time(&now, &self.layout);
    }
}

struct Shared {
    renderer: Renderer,
    output: Output,
    time: Option<TimeSource>,
    auto_flush: bool,
    owner: OwnerToken,
    released: AtomicBool,
}

impl Shared {
    fn cache(&self) -> Option<&Arc<TimeCache>> {
        self.time.as_ref().and_then(|t| t.cache.as_ref())
    }

    /// Stops the timestamp cache and closes owned sinks, once. `None` means
    /// cancellation, which acts for whoever owns the resources.
    fn release(&self, owner: Option<OwnerToken>) -> bool {
        if owner.is_some_and(|o| o != self.owner) {
            return false;
        }
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        if let Some(cache) = self.cache() {
            match owner {
                Some(owner) => lifecycle::release(cache, owner),
                None => lifecycle::release_any(cache),
            };
        }
        self.output.close();
        true
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Some(cache) = self.cache() {
            cache.close();
        }
    }
}

enum Fields<'s, 'a> {
    Args(&'s [Value<'a>]),
    Known(&'s [Field<'a>]),
}

/// A structured logger.
#[derive(Clone)]
pub struct Logger {
    shared: Arc<Shared>,
    /// Pre-rendered fields attached with `with`.
    base: Arc<[u8]>,
    forced: Option<Level>,
    min_level: Level,
    loglevel_field: bool,
    token: OwnerToken,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("renderer", &self.shared.renderer.name())
            .field("min_level", &self.min_level)
            .field("forced", &self.forced)
            .field("base_len", &self.base.len())
            .finish()
    }
}

impl Logger {
    /// Builds a logger writing to `output`, colored with the default scheme
    /// when the configuration asks for color.
    pub fn new(config: &Config, output: Output) -> Self {
        Self::build(config, output, color::default_scheme().as_ref(), system_clock())
    }

    /// Builds a logger with an explicit color scheme and clock.
    pub fn build(config: &Config, output: Output, scheme: &dyn ColorScheme, clock: Clock) -> Self {
        let layout = Arc::new(TimeLayout::parse_or_default(&config.time_layout));
        let opts = EncodeOptions {
            non_finite: config.non_finite,
            verbose: config.verbose_fields,
            layout: layout.clone(),
        };
        let color = config.use_color(output.is_terminal()).then_some(scheme);
        let renderer = Renderer::new(config.mode, color, opts);
        let owner = OwnerToken::new();

        let time = config.timestamp.then(|| {
            let cache = TimeCache::start_with(
                layout.clone(),
                config.utc,
                crate::time_cache::REFRESH_INTERVAL,
                clock.clone(),
            );
            if let Some(cache) = &cache {
                lifecycle::claim(cache, owner);
            }
            TimeSource {
                layout,
                utc: config.utc,
                clock,
                cache,
            }
        });

        tracing::debug!(
            renderer = renderer.name(),
            level = %config.level,
            cached_time = time.as_ref().is_some_and(|t| t.cache.is_some()),
            "logger created"
        );

        Self {
            shared: Arc::new(Shared {
                renderer,
                output,
                time,
                auto_flush: config.auto_flush,
                owner,
                released: AtomicBool::new(false),
            }),
            base: Arc::from(&[][..]),
            forced: None,
            min_level: config.level,
            loglevel_field: config.loglevel_field,
            token: owner,
        }
    }

    /// Builds a logger for `config.output`, or for `fallback` when no files
    /// are configured. If a file cannot be opened the logger uses `fallback`
    /// and reports the failure through it once.
    pub fn from_config(config: &Config, fallback: Output) -> Self {
        if config.output.is_empty() {
            return Self::new(config, fallback);
        }
        let targets = config.output.iter().cloned().map(Target::File).collect();
        match Output::tee(targets) {
            Ok(output) => Self::new(config, output),
            Err(err) => {
                tracing::warn!(%err, "could not open log output, using fallback");
                let logger = Self::new(config, fallback);
                let paths = config
                    .output
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(",");
                logger.log(
                    Level::Error,
                    "could not open log output",
                    &[
                        Value::from("path"),
                        Value::from(&paths),
                        Value::from("error"),
                        Value::error(&err),
                    ],
                );
                logger
            }
        }
    }

    /// Builds a logger from the environment, falling back to stderr.
    pub fn from_env() -> Self {
        Self::from_config(&Config::from_env(), Output::stderr())
    }

    fn effective(&self, level: Level) -> Option<Level> {
        let level = self.forced.unwrap_or(level);
        if level == Level::Disabled || self.min_level == Level::Disabled || level < self.min_level {
            None
        } else {
            Some(level)
        }
    }

    /// Whether a line at `level` would be written.
    pub fn enabled(&self, level: Level) -> bool {
        self.effective(level).is_some()
    }

    /// Minimum level this logger writes.
    pub fn min_level(&self) -> Level {
        self.min_level
    }

    pub fn output(&self) -> &Output {
        &self.shared.output
    }

    /// The shared timestamp cache, if the layout could be cached.
    pub fn time_cache(&self) -> Option<Arc<TimeCache>> {
        self.shared.cache().cloned()
    }

    /// Logs `msg` with a flat `key, value, ...` argument list.
    pub fn log(&self, level: Level, msg: &str, args: &[Value<'_>]) {
        if let Some(level) = self.effective(level) {
            dispatch!(&self.shared.renderer, enc => self.render(enc, level, msg, Fields::Args(args)));
        }
    }

    /// Logs with pre-built fields whose keys were scanned up front.
    pub fn log_fields(&self, level: Level, msg: &str, fields: &[Field<'_>]) {
        if let Some(level) = self.effective(level) {
            dispatch!(&self.shared.renderer, enc => self.render(enc, level, msg, Fields::Known(fields)));
        }
    }

    /// Logs a formatted message. Formatting only happens when the level is
    /// enabled.
    pub fn log_fmt(&self, level: Level, msg: fmt::Arguments<'_>, args: &[Value<'_>]) {
        if !self.enabled(level) {
            return;
        }
        match msg.as_str() {
            Some(s) => self.log(level, s, args),
            None => self.log(level, &msg.to_string(), args),
        }
    }

    pub fn trace(&self, msg: &str, args: &[Value<'_>]) {
        self.log(Level::Trace, msg, args);
    }

    pub fn debug(&self, msg: &str, args: &[Value<'_>]) {
        self.log(Level::Debug, msg, args);
    }

    pub fn info(&self, msg: &str, args: &[Value<'_>]) {
        self.log(Level::Info, msg, args);
    }

    pub fn warn(&self, msg: &str, args: &[Value<'_>]) {
        self.log(Level::Warn, msg, args);
    }

    pub fn error(&self, msg: &str, args: &[Value<'_>]) {
        self.log(Level::Error, msg, args);
    }

    /// Writes a fatal line. Does not exit the process.
    pub fn fatal(&self, msg: &str, args: &[Value<'_>]) {
        self.log(Level::Fatal, msg, args);
    }

    /// Writes a panic line. Does not unwind.
    pub fn panic(&self, msg: &str, args: &[Value<'_>]) {
        self.log(Level::Panic, msg, args);
    }

    fn render<E: LineEncoder>(&self, enc: &E, level: Level, msg: &str, fields: Fields<'_, '_>) {
        let shared = &*self.shared;
        let mut buf = line_buffer::acquire();
        buf.set_auto_flush(shared.auto_flush);
        enc.begin(&mut buf);
        if let Some(time) = &shared.time {
            enc.timestamp(&mut buf, |buf| time.write(buf));
        }
        enc.level(&mut buf, level);
        enc.message(&mut buf, msg);
        buf.push_bytes(&self.base);
        if self.loglevel_field {
            enc.field(&mut buf, KeyRef::Name("loglevel"), &Value::Str(level.name()));
        }
        buf.maybe_flush(&shared.output);
        match fields {
            Fields::Args(args) => {
                for (key, value) in pairs(args) {
                    enc.field(&mut buf, key, value);
                    buf.maybe_flush(&shared.output);
                }
            }
            Fields::Known(fields) => {
                for field in fields {
                    enc.field(&mut buf, KeyRef::Known(field.key), &field.value);
                    buf.maybe_flush(&shared.output);
                }
            }
        }
        enc.end(&mut buf);
        buf.commit(&shared.output);
    }

    fn render_base<E: LineEncoder>(&self, enc: &E, fields: Fields<'_, '_>) -> Arc<[u8]> {
        let mut buf = line_buffer::acquire();
        buf.push_bytes(&self.base);
        match fields {
            Fields::Args(args) => {
                for (key, value) in pairs(args) {
                    enc.field(&mut buf, key, value);
                }
            }
            Fields::Known(fields) => {
                for field in fields {
                    enc.field(&mut buf, KeyRef::Known(field.key), &field.value);
                }
            }
        }
        Arc::from(buf.as_bytes())
    }

    fn derive(&self) -> Self {
        Self {
            token: OwnerToken::new(),
            ..self.clone()
        }
    }

    /// Returns a logger that adds `args` to every line. The fields are
    /// rendered once, here.
    pub fn with(&self, args: &[Value<'_>]) -> Self {
        let base = dispatch!(&self.shared.renderer, enc => self.render_base(enc, Fields::Args(args)));
        Self {
            base,
            ..self.derive()
        }
    }

    /// Like [`Self::with`] for pre-built fields.
    pub fn with_fields(&self, fields: &[Field<'_>]) -> Self {
        let base = dispatch!(&self.shared.renderer, enc => self.render_base(enc, Fields::Known(fields)));
        Self {
            base,
            ..self.derive()
        }
    }

    /// Returns a logger that adds a `loglevel` field naming each line's level.
    pub fn with_log_level(&self) -> Self {
        Self {
            loglevel_field: true,
            ..self.derive()
        }
    }

    /// Returns a logger that writes every line at `level`, whatever level
    /// the call asks for. `Level::Disabled` silences it.
    pub fn set_level(&self, level: Level) -> Self {
        Self {
            forced: Some(level),
            ..self.derive()
        }
    }

    /// Returns a logger with a different minimum level.
    pub fn with_min_level(&self, level: Level) -> Self {
        Self {
            min_level: level,
            ..self.derive()
        }
    }

    /// Releases this logger's resources when `ctx` is cancelled: the
    /// timestamp cache stops and files the logger opened are closed.
    /// Caller-supplied writers stay open.
    pub fn attach(&self, ctx: &Context) {
        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        ctx.on_cancel(move || {
            if let Some(shared) = shared.upgrade() {
                if shared.release(None) {
                    tracing::debug!("logger resources released on cancellation");
                }
            }
        });
    }

    /// Releases resources if this logger owns them, then waits up to
    /// `timeout` for the timestamp refresher to exit. Returns whether this
    /// call released anything.
    pub fn close(&self, timeout: Duration) -> bool {
        if !self.shared.release(Some(self.token)) {
            return false;
        }
        if let Some(cache) = self.shared.cache() {
            cache.wait_stopped(timeout);
        }
        true
    }

    /// A handle that can shut the logger down later. Only the owning logger
    /// gets one.
    pub fn shutdown_handle(&self) -> Option<ShutdownHandle> {
        (self.token == self.shared.owner).then(|| ShutdownHandle {
            shared: Arc::downgrade(&self.shared),
            owner: self.token,
        })
    }
}

/// Explicit shutdown for a logger's owned resources.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    shared: Weak<Shared>,
    owner: OwnerToken,
}

impl ShutdownHandle {
    /// Releases the resources and waits up to `timeout` for the refresher to
    /// stop. Returns `true` once everything is stopped.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        let Some(shared) = self.shared.upgrade() else {
            return true;
        };
        shared.release(Some(self.owner));
        match shared.cache() {
            Some(cache) => cache.wait_stopped(timeout),
            None => true,
        }
    }
}
