//! Line encoders.
//!
//! Two layouts (console and JSON) times two styles (plain and colored) give
//! the four logger variants. Layout decides syntax; style only decides what
//! wraps each token. Colored styles insert SGR sequences around tokens and
//! nothing else, so stripping ANSI codes from a colored line reproduces the
//! plain line byte for byte.
//!
//! Console: `[ts ]LVL[ message][ key=value ...]`
//!
//! JSON: `{"ts":"...","lvl":"info","msg":"...","key":value,...}`
//!
//! Every field is self-delimiting (a leading space in console, a leading
//! comma in JSON), so a run of rendered fields can be stored once and
//! replayed as a logger's base payload.

use std::cell::Cell;
use std::fmt::Write as _;
use std::sync::Arc;

use crate::color::{ColorScheme, Role, RESET};
use crate::config::NonFinite;
use crate::escape;
use crate::level::Level;
use crate::line_buffer::{LineBuffer, VecWriter};
use crate::scanner::{self, Encoding};
use crate::time_cache::TimeLayout;
use crate::value::{KeyRef, Value};

/// Token decoration.
pub trait Style: Send + Sync {
    fn open(&self, out: &mut Vec<u8>, role: Role);
    fn close(&self, out: &mut Vec<u8>, role: Role);
}

/// No decoration.
#[derive(Debug, Clone, Copy, Default)]
pub struct Plain;

impl Style for Plain {
    #[inline(always)]
    fn open(&self, _out: &mut Vec<u8>, _role: Role) {}

    #[inline(always)]
    fn close(&self, _out: &mut Vec<u8>, _role: Role) {}
}

/// ANSI decoration from a snapshot of a [`ColorScheme`].
#[derive(Debug, Clone)]
pub struct Colored {
    codes: [Box<str>; Role::COUNT],
}

impl Colored {
    pub fn new(scheme: &dyn ColorScheme) -> Self {
        let mut codes: [Box<str>; Role::COUNT] = std::array::from_fn(|_| Box::from(""));
        for role in Role::all() {
            codes[role.index()] = Box::from(scheme.sgr(role));
        }
        Self { codes }
    }
}

impl Style for Colored {
    #[inline]
    fn open(&self, out: &mut Vec<u8>, role: Role) {
        out.extend_from_slice(self.codes[role.index()].as_bytes());
    }

    #[inline]
    fn close(&self, out: &mut Vec<u8>, role: Role) {
        if !self.codes[role.index()].is_empty() {
            out.extend_from_slice(RESET.as_bytes());
        }
    }
}

/// Rendering options fixed when a logger is built.
#[derive(Debug, Clone)]
pub struct EncodeOptions {
    pub non_finite: NonFinite,
    /// Use `time`/`level`/`message` instead of `ts`/`lvl`/`msg` in JSON.
    pub verbose: bool,
    /// Layout for timestamp field values.
    pub layout: Arc<TimeLayout>,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            non_finite: NonFinite::default(),
            verbose: false,
            layout: Arc::new(TimeLayout::default()),
        }
    }
}

/// One rendering variant.
///
/// A line is `begin`, optional `timestamp`, `level`, `message`, any number of
/// `field`s, then `end`.
pub trait LineEncoder: Send + Sync {
    const ENCODING: Encoding;

    fn options(&self) -> &EncodeOptions;

    fn begin(&self, buf: &mut LineBuffer);

    /// Writes the timestamp token. `write` appends the unquoted text.
    fn timestamp(&self, buf: &mut LineBuffer, write: impl FnOnce(&mut LineBuffer));

    fn level(&self, buf: &mut LineBuffer, level: Level);

    /// Writes the message. Empty messages are omitted.
    fn message(&self, buf: &mut LineBuffer, msg: &str);

    fn field(&self, buf: &mut LineBuffer, key: KeyRef<'_>, value: &Value<'_>);

    fn end(&self, buf: &mut LineBuffer);
}

fn non_finite_text(v: f64) -> &'static str {
    if v.is_nan() {
        "NaN"
    } else if v.is_sign_positive() {
        "+Inf"
    } else {
        "-Inf"
    }
}

/// Value rendering shared by both layouts.
#[derive(Debug, Clone)]
struct Values<S> {
    style: S,
    opts: EncodeOptions,
}

impl<S: Style> Values<S> {
    #[inline]
    fn paint(&self, buf: &mut LineBuffer, role: Role, f: impl FnOnce(&mut LineBuffer)) {
        self.style.open(buf.bytes_mut(), role);
        f(buf);
        self.style.close(buf.bytes_mut(), role);
    }

    fn null(&self, buf: &mut LineBuffer) {
        buf.push_null_with(|out| {
            self.style.open(out, Role::Null);
            out.extend_from_slice(b"null");
            self.style.close(out, Role::Null);
        });
    }

    fn non_finite(&self, buf: &mut LineBuffer, enc: Encoding, v: f64) {
        match self.opts.non_finite {
            NonFinite::Null => self.null(buf),
            NonFinite::String => {
                self.paint(buf, Role::Number, |buf| buf.push_str_as(enc, non_finite_text(v)))
            }
        }
    }

    fn write(&self, buf: &mut LineBuffer, enc: Encoding, value: &Value<'_>) {
        match *value {
            Value::Null => self.null(buf),
            Value::Str(s) => self.paint(buf, Role::Str, |buf| buf.push_str_as(enc, s)),
            Value::Bool(v) => buf.push_bool_with(v, |out, v| {
                self.style.open(out, Role::Bool);
                out.extend_from_slice(if v { b"true" } else { b"false" });
                self.style.close(out, Role::Bool);
            }),
            Value::I64(v) => self.paint(buf, Role::Number, |buf| buf.push_i64(v)),
            Value::U64(v) => self.paint(buf, Role::Number, |buf| buf.push_u64(v)),
            Value::F64(v) if v.is_finite() => self.paint(buf, Role::Number, |buf| buf.push_f64(v)),
            Value::F64(v) => self.non_finite(buf, enc, v),
            Value::F32(v) if v.is_finite() => self.paint(buf, Role::Number, |buf| buf.push_f32(v)),
            Value::F32(v) => self.non_finite(buf, enc, v as f64),
            Value::Duration(d) => self.paint(buf, Role::Duration, |buf| {
                let start = buf.len();
                buf.push_duration(d);
                buf.quote_since(start, enc);
            }),
            Value::Time(ref dt) => self.paint(buf, Role::Time, |buf| {
                let start = buf.len();
                buf.push_time(dt, &self.opts.layout);
                buf.quote_since(start, enc);
            }),
            Value::Bytes(b) => {
                let text = String::from_utf8_lossy(b);
                self.paint(buf, Role::Str, |buf| buf.push_str_as(enc, &text));
            }
            Value::Array(items) => {
                buf.push(b'[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        buf.push(b',');
                    }
                    self.write(buf, Encoding::Json, item);
                }
                buf.push(b']');
            }
            Value::Display(d) => self.paint(buf, Role::Str, |buf| {
                buf.with_scratch(
                    |scratch| {
                        let _ = write!(VecWriter(scratch), "{d}");
                    },
                    |out, text| escape::append_bytes(out, enc, text),
                )
            }),
            Value::Error(err) => self.paint(buf, Role::Error, |buf| {
                buf.with_scratch(
                    |scratch| {
                        let _ = write!(VecWriter(scratch), "{err}");
                    },
                    |out, text| escape::append_bytes(out, enc, text),
                )
            }),
            Value::Json(v) => {
                let failed = Cell::new(false);
                buf.with_scratch(
                    |scratch| {
                        if let Err(msg) = v.write_json(scratch) {
                            scratch.clear();
                            scratch.extend_from_slice(b"!ERROR: ");
                            scratch.extend_from_slice(msg.as_bytes());
                            failed.set(true);
                        }
                    },
                    |out, text| {
                        let role = if failed.get() { Role::Error } else { Role::Json };
                        self.style.open(out, role);
                        match (enc, failed.get()) {
                            (Encoding::Json, false) => out.extend_from_slice(text),
                            _ => escape::append_bytes(out, enc, text),
                        }
                        self.style.close(out, role);
                    },
                );
            }
        }
    }
}

/// Human-oriented `key=value` lines.
#[derive(Debug, Clone)]
pub struct ConsoleEncoder<S> {
    values: Values<S>,
}

impl<S: Style> ConsoleEncoder<S> {
    pub fn new(style: S, opts: EncodeOptions) -> Self {
        Self {
            values: Values { style, opts },
        }
    }

    fn key(&self, buf: &mut LineBuffer, key: KeyRef<'_>) {
        self.values.paint(buf, Role::Key, |buf| match key {
            KeyRef::Known(key) => match key.trusted(Encoding::Console) {
                Some(name) => escape::append_console_trusted(buf.bytes_mut(), name),
                None => buf.push_console_str(key.name()),
            },
            KeyRef::Name(name) => buf.push_console_str(name),
            KeyRef::Arg(n) => {
                buf.push_str("arg");
                buf.push_u64(n as u64);
            }
        });
    }
}

impl<S: Style> LineEncoder for ConsoleEncoder<S> {
    const ENCODING: Encoding = Encoding::Console;

    fn options(&self) -> &EncodeOptions {
        &self.values.opts
    }

    fn begin(&self, _buf: &mut LineBuffer) {}

    fn timestamp(&self, buf: &mut LineBuffer, write: impl FnOnce(&mut LineBuffer)) {
        self.values.paint(buf, Role::Timestamp, write);
        buf.push(b' ');
    }

    fn level(&self, buf: &mut LineBuffer, level: Level) {
        self.values
            .paint(buf, Role::Level(level), |buf| buf.push_str(level.code()));
    }

    fn message(&self, buf: &mut LineBuffer, msg: &str) {
        if msg.is_empty() {
            return;
        }
        buf.push(b' ');
        self.values.paint(buf, Role::Message, |buf| {
            if scanner::is_trusted(Encoding::Json, msg.as_bytes()) {
                buf.push_str(msg);
            } else {
                buf.push_json_str(msg);
            }
        });
    }

    fn field(&self, buf: &mut LineBuffer, key: KeyRef<'_>, value: &Value<'_>) {
        buf.push(b' ');
        self.key(buf, key);
        buf.push(b'=');
        self.values.write(buf, Encoding::Console, value);
    }

    fn end(&self, buf: &mut LineBuffer) {
        buf.push(b'\n');
    }
}

/// One JSON object per line.
#[derive(Debug, Clone)]
pub struct JsonEncoder<S> {
    values: Values<S>,
}

impl<S: Style> JsonEncoder<S> {
    pub fn new(style: S, opts: EncodeOptions) -> Self {
        Self {
            values: Values { style, opts },
        }
    }

    fn names(&self) -> (&'static str, &'static str, &'static str) {
        if self.values.opts.verbose {
            ("time", "level", "message")
        } else {
            ("ts", "lvl", "msg")
        }
    }

    /// Writes `"name":` for a reserved key.
    fn reserved_key(&self, buf: &mut LineBuffer, name: &str) {
        self.values.paint(buf, Role::Key, |buf| {
            buf.push(b'"');
            buf.push_str(name);
            buf.push(b'"');
        });
        buf.push(b':');
    }

    fn key(&self, buf: &mut LineBuffer, key: KeyRef<'_>) {
        self.values.paint(buf, Role::Key, |buf| match key {
            KeyRef::Known(key) => match key.trusted(Encoding::Json) {
                Some(name) => escape::append_json_trusted(buf.bytes_mut(), name),
                None => buf.push_json_str(key.name()),
            },
            KeyRef::Name(name) => buf.push_json_str(name),
            KeyRef::Arg(n) => {
                buf.push_str("\"arg");
                buf.push_u64(n as u64);
                buf.push(b'"');
            }
        });
        buf.push(b':');
    }
}

impl<S: Style> LineEncoder for JsonEncoder<S> {
    const ENCODING: Encoding = Encoding::Json;

    fn options(&self) -> &EncodeOptions {
        &self.values.opts
    }

    fn begin(&self, buf: &mut LineBuffer) {
        buf.push(b'{');
    }

    fn timestamp(&self, buf: &mut LineBuffer, write: impl FnOnce(&mut LineBuffer)) {
        let (ts, _, _) = self.names();
        self.reserved_key(buf, ts);
        self.values.paint(buf, Role::Timestamp, |buf| {
            let start = buf.len();
            write(buf);
            buf.quote_since(start, Encoding::Json);
        });
        buf.push(b',');
    }

    fn level(&self, buf: &mut LineBuffer, level: Level) {
        let (_, lvl, _) = self.names();
        self.reserved_key(buf, lvl);
        self.values.paint(buf, Role::Level(level), |buf| {
            buf.push(b'"');
            buf.push_str(level.name());
            buf.push(b'"');
        });
    }

    fn message(&self, buf: &mut LineBuffer, msg: &str) {
        if msg.is_empty() {
            return;
        }
        let (_, _, key) = self.names();
        buf.push(b',');
        self.reserved_key(buf, key);
        self.values
            .paint(buf, Role::Message, |buf| buf.push_json_str(msg));
    }

    fn field(&self, buf: &mut LineBuffer, key: KeyRef<'_>, value: &Value<'_>) {
        buf.push(b',');
        self.key(buf, key);
        self.values.write(buf, Encoding::Json, value);
    }

    fn end(&self, buf: &mut LineBuffer) {
        buf.push_str("}\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Palette;
    use crate::value::{pairs, Key};
    use std::time::Duration;

    fn render<E: LineEncoder>(enc: &E, level: Level, msg: &str, args: &[Value<'_>]) -> String {
        let mut buf = LineBuffer::default();
        enc.begin(&mut buf);
        enc.level(&mut buf, level);
        enc.message(&mut buf, msg);
        for (key, value) in pairs(args) {
            enc.field(&mut buf, key, value);
        }
        enc.end(&mut buf);
        String::from_utf8(buf.as_bytes().to_vec()).unwrap()
    }

    fn strip_ansi(s: &str) -> String {
        let mut out = String::new();
        let mut chars = s.chars();
        while let Some(c) = chars.next() {
            if c == '\x1b' {
                for c in chars.by_ref() {
                    if c == 'm' {
                        break;
                    }
                }
            } else {
                out.push(c);
            }
        }
        out
    }

    #[test]
    fn test_console_basic() {
        let enc = ConsoleEncoder::new(Plain, EncodeOptions::default());
        let args = crate::fields!["port", 8080, "user_name", "alice bob", "ok", true];
        assert_eq!(
            render(&enc, Level::Info, "ready", &args),
            "INF ready port=8080 user_name=\"alice bob\" ok=true\n"
        );
    }

    #[test]
    fn test_json_basic() {
        let enc = JsonEncoder::new(Plain, EncodeOptions::default());
        let args = crate::fields!["port", 8080, "ratio", 0.5, "none", Value::Null];
        let line = render(&enc, Level::Info, "ready", &args);
        assert_eq!(
            line,
            "{\"lvl\":\"info\",\"msg\":\"ready\",\"port\":8080,\"ratio\":0.5,\"none\":null}\n"
        );
        let parsed: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["port"], 8080);
    }

    #[test]
    fn test_verbose_names() {
        let opts = EncodeOptions {
            verbose: true,
            ..EncodeOptions::default()
        };
        let enc = JsonEncoder::new(Plain, opts);
        assert_eq!(
            render(&enc, Level::Warn, "hi", &[]),
            "{\"level\":\"warn\",\"message\":\"hi\"}\n"
        );
    }

    #[test]
    fn test_empty_message_omitted() {
        let console = ConsoleEncoder::new(Plain, EncodeOptions::default());
        let json = JsonEncoder::new(Plain, EncodeOptions::default());
        let args = crate::fields!["k", 1];
        assert_eq!(render(&console, Level::Debug, "", &args), "DBG k=1\n");
        assert_eq!(
            render(&json, Level::Debug, "", &args),
            "{\"lvl\":\"debug\",\"k\":1}\n"
        );
    }

    #[test]
    fn test_non_finite_policy() {
        let nan = crate::fields!["v", f64::NAN, "w", f32::NEG_INFINITY];
        let strings = JsonEncoder::new(Plain, EncodeOptions::default());
        assert_eq!(
            render(&strings, Level::Info, "", &nan),
            "{\"lvl\":\"info\",\"v\":\"NaN\",\"w\":\"-Inf\"}\n"
        );
        let nulls = JsonEncoder::new(
            Plain,
            EncodeOptions {
                non_finite: NonFinite::Null,
                ..EncodeOptions::default()
            },
        );
        assert_eq!(
            render(&nulls, Level::Info, "", &nan),
            "{\"lvl\":\"info\",\"v\":null,\"w\":null}\n"
        );
        let console = ConsoleEncoder::new(Plain, EncodeOptions::default());
        assert_eq!(render(&console, Level::Info, "", &nan), "INF v=NaN w=-Inf\n");
    }

    #[test]
    fn test_odd_arguments() {
        let args = crate::fields!["a", 1, "dangling"];
        let console = ConsoleEncoder::new(Plain, EncodeOptions::default());
        let json = JsonEncoder::new(Plain, EncodeOptions::default());
        assert_eq!(render(&console, Level::Info, "", &args), "INF a=1 arg1=dangling\n");
        assert_eq!(
            render(&json, Level::Info, "", &args),
            "{\"lvl\":\"info\",\"a\":1,\"arg1\":\"dangling\"}\n"
        );
    }

    #[test]
    fn test_duration_array_and_error() {
        let err = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let items = crate::fields![1, "two", 2.5];
        let args = [
            Value::from("took"),
            Value::from(Duration::from_millis(1500)),
            Value::from("items"),
            Value::Array(&items),
            Value::from("err"),
            Value::error(&err),
        ];
        let console = ConsoleEncoder::new(Plain, EncodeOptions::default());
        let json = JsonEncoder::new(Plain, EncodeOptions::default());
        assert_eq!(
            render(&console, Level::Error, "", &args),
            "ERR took=1.5s items=[1,\"two\",2.5] err=\"disk full\"\n"
        );
        assert_eq!(
            render(&json, Level::Error, "", &args),
            "{\"lvl\":\"error\",\"took\":\"1.5s\",\"items\":[1,\"two\",2.5],\"err\":\"disk full\"}\n"
        );
    }

    #[test]
    fn test_json_fallback_and_marshal_error() {
        #[derive(serde::Serialize)]
        struct Point {
            x: i32,
            y: i32,
        }
        struct Broken;
        impl serde::Serialize for Broken {
            fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
                Err(serde::ser::Error::custom("no way"))
            }
        }
        let p = Point { x: 1, y: 2 };
        let args = [
            Value::from("p"),
            Value::json(&p),
            Value::from("bad"),
            Value::json(&Broken),
        ];
        let console = ConsoleEncoder::new(Plain, EncodeOptions::default());
        let json = JsonEncoder::new(Plain, EncodeOptions::default());
        assert_eq!(
            render(&console, Level::Info, "", &args),
            concat!(r#"INF p="{\"x\":1,\"y\":2}" bad="!ERROR: no way""#, "\n")
        );
        assert_eq!(
            render(&json, Level::Info, "", &args),
            "{\"lvl\":\"info\",\"p\":{\"x\":1,\"y\":2},\"bad\":\"!ERROR: no way\"}\n"
        );
    }

    #[test]
    fn test_console_message_escaping() {
        let enc = ConsoleEncoder::new(Plain, EncodeOptions::default());
        assert_eq!(render(&enc, Level::Info, "two words", &[]), "INF two words\n");
        assert_eq!(render(&enc, Level::Info, "line\nbreak", &[]), "INF \"line\\nbreak\"\n");
    }

    #[test]
    fn test_known_keys() {
        let enc = ConsoleEncoder::new(Plain, EncodeOptions::default());
        let mut buf = LineBuffer::default();
        enc.field(&mut buf, KeyRef::Known(Key::new("a b")), &Value::from(1));
        enc.field(&mut buf, KeyRef::Known(Key::new("ok")), &Value::from(2));
        assert_eq!(buf.as_bytes(), b" \"a b\"=1 ok=2");
    }

    #[test]
    fn test_known_keys_match_named_keys() {
        let console = ConsoleEncoder::new(Plain, EncodeOptions::default());
        let json = JsonEncoder::new(Plain, EncodeOptions::default());
        for name in ["ok", "a b", "", "quote\"d", "ünï"] {
            let value = Value::from(1);
            let mut known = LineBuffer::default();
            let mut named = LineBuffer::default();
            console.field(&mut known, KeyRef::Known(Key::new(name)), &value);
            console.field(&mut named, KeyRef::Name(name), &value);
            json.field(&mut known, KeyRef::Known(Key::new(name)), &value);
            json.field(&mut named, KeyRef::Name(name), &value);
            assert_eq!(known.as_bytes(), named.as_bytes(), "{name:?}");
        }
    }

    #[test]
    fn test_color_strips_to_plain() {
        let scheme = Palette::default();
        let err = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let items = crate::fields![true, Value::Null, 3];
        let args = [
            Value::from("n"),
            Value::from(-7),
            Value::from("s"),
            Value::from("a b"),
            Value::from("b"),
            Value::from(false),
            Value::from("f"),
            Value::from(f64::NAN),
            Value::from("arr"),
            Value::Array(&items),
            Value::from("err"),
            Value::error(&err),
            Value::from(Duration::from_micros(3)),
        ];
        for level in Level::ALL {
            let plain = render(
                &ConsoleEncoder::new(Plain, EncodeOptions::default()),
                level,
                "msg here",
                &args,
            );
            let color = render(
                &ConsoleEncoder::new(Colored::new(&scheme), EncodeOptions::default()),
                level,
                "msg here",
                &args,
            );
            assert_ne!(plain, color);
            assert_eq!(strip_ansi(&color), plain);

            let plain = render(
                &JsonEncoder::new(Plain, EncodeOptions::default()),
                level,
                "msg here",
                &args,
            );
            let color = render(
                &JsonEncoder::new(Colored::new(&scheme), EncodeOptions::default()),
                level,
                "msg here",
                &args,
            );
            assert_eq!(strip_ansi(&color), plain);
        }
    }

    #[test]
    fn test_error_is_colored_with_error_role() {
        let scheme = Palette::default();
        let enc = ConsoleEncoder::new(Colored::new(&scheme), EncodeOptions::default());
        let err = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let mut buf = LineBuffer::default();
        enc.field(&mut buf, KeyRef::Name("err"), &Value::error(&err));
        let line = String::from_utf8(buf.as_bytes().to_vec()).unwrap();
        assert!(line.contains("\x1b[31m\"disk full\"\x1b[0m"));
    }
}
