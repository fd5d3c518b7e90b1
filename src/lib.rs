//! # linelog
//!
//! A structured line logger built around an allocation-free hot path.
//!
//! * **Four variants, one contract**: console or JSON lines, plain or
//!   colored. Stripping ANSI codes from a colored line gives exactly the
//!   plain line.
//! * **No per-call allocation**: lines are rendered into pooled buffers with
//!   small inline caches for floats, durations and timestamps.
//! * **Escape only when needed**: strings are scanned for unsafe bytes with
//!   SIMD or word-at-a-time scanners and copied verbatim when clean.
//! * **Cached timestamps**: a background thread keeps "now" formatted, so
//!   log calls copy bytes instead of formatting dates.
//!
//! ## Main Components
//!
//! * `Logger`: the log-call API, `with` derivations and lifecycle
//! * `encoder`: console and JSON renderers over plain or colored styles
//! * `line_buffer`: pooled buffers and literal caches
//! * `scanner` / `escape`: unsafe-byte detection and escaping
//! * `time_cache`: time layouts and the refreshed timestamp
//! * `lifecycle`: ownership registry and cancellation `Context`
//! * `output`: line-atomic destinations, tee and write observation
//!
//! ## Quick Start
//!
//! ```
//! use linelog::{fields, Config, Logger, Mode, Output};
//!
//! let config = Config::default().with_mode(Mode::Json).with_timestamp(false);
//! let log = Logger::new(&config, Output::stdout());
//!
//! log.info("ready", &fields!["port", 8080]);
//! let db = log.with(&fields!["component", "db"]);
//! db.warn("slow query", &fields!["took", std::time::Duration::from_millis(250)]);
//! ```

pub mod bridge;
pub mod color;
pub mod config;
pub mod encoder;
pub mod error;
pub mod escape;
pub mod level;
pub mod lifecycle;
pub mod line_buffer;
pub mod logger;
pub mod output;
pub mod scanner;
pub mod time_cache;
pub mod value;

pub use color::{ColorScheme, Palette, Role};
pub use config::{ColorChoice, Config, Mode, NonFinite};
pub use error::{Error, Result};
pub use level::Level;
pub use lifecycle::{Context, OwnerToken};
pub use logger::{Logger, ShutdownHandle};
pub use output::{ObservedWriter, Output, Target, WriteStats};
pub use time_cache::{TimeCache, TimeLayout};
pub use value::{Field, JsonValue, Key, Value};
