//! Field keys and values.
//!
//! Values borrow from the caller for the duration of one log call, so
//! logging a string or a slice never copies it onto the heap. Anything the
//! closed set below does not cover goes through [`Value::Json`], which
//! carries a serializer for the value.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};

use crate::escape::Trusted;
use crate::scanner::Encoding;

/// Serializes a value as JSON text. Blanket-implemented for every
/// `serde::Serialize` type.
pub trait JsonValue {
    fn write_json(&self, out: &mut Vec<u8>) -> Result<(), String>;
}

impl<T: serde::Serialize + ?Sized> JsonValue for T {
    fn write_json(&self, out: &mut Vec<u8>) -> Result<(), String> {
        serde_json::to_writer(out, self).map_err(|err| err.to_string())
    }
}

/// A loggable value.
#[derive(Clone, Copy)]
pub enum Value<'a> {
    Null,
    Str(&'a str),
    Bool(bool),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Duration(Duration),
    Time(DateTime<FixedOffset>),
    Bytes(&'a [u8]),
    Array(&'a [Value<'a>]),
    /// Rendered through `Display`, as a string.
    Display(&'a dyn fmt::Display),
    /// Rendered as the error's message.
    Error(&'a (dyn std::error::Error + 'a)),
    /// Opaque fallback rendered through its serializer.
    Json(&'a dyn JsonValue),
}

impl<'a> Value<'a> {
    pub fn display(v: &'a dyn fmt::Display) -> Self {
        Value::Display(v)
    }

    pub fn error(err: &'a (dyn std::error::Error + 'a)) -> Self {
        Value::Error(err)
    }

    pub fn json(v: &'a dyn JsonValue) -> Self {
        Value::Json(v)
    }

    pub fn as_str(&self) -> Option<&'a str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Debug for Value<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Str(s) => f.debug_tuple("Str").field(s).finish(),
            Value::Bool(v) => f.debug_tuple("Bool").field(v).finish(),
            Value::I64(v) => f.debug_tuple("I64").field(v).finish(),
            Value::U64(v) => f.debug_tuple("U64").field(v).finish(),
            Value::F32(v) => f.debug_tuple("F32").field(v).finish(),
            Value::F64(v) => f.debug_tuple("F64").field(v).finish(),
            Value::Duration(v) => f.debug_tuple("Duration").field(v).finish(),
            Value::Time(v) => f.debug_tuple("Time").field(v).finish(),
            Value::Bytes(v) => f.debug_tuple("Bytes").field(v).finish(),
            Value::Array(v) => f.debug_tuple("Array").field(v).finish(),
            Value::Display(v) => f.debug_tuple("Display").field(&v.to_string()).finish(),
            Value::Error(v) => f.debug_tuple("Error").field(&v.to_string()).finish(),
            Value::Json(_) => f.write_str("Json(..)"),
        }
    }
}

impl<'a> From<&'a str> for Value<'a> {
    fn from(v: &'a str) -> Self {
        Value::Str(v)
    }
}

impl<'a> From<&'a String> for Value<'a> {
    fn from(v: &'a String) -> Self {
        Value::Str(v.as_str())
    }
}

impl From<bool> for Value<'_> {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

macro_rules! from_signed {
    ($($t:ty),*) => {$(
        impl From<$t> for Value<'_> {
            fn from(v: $t) -> Self {
                Value::I64(v as i64)
            }
        }
    )*};
}

macro_rules! from_unsigned {
    ($($t:ty),*) => {$(
        impl From<$t> for Value<'_> {
            fn from(v: $t) -> Self {
                Value::U64(v as u64)
            }
        }
    )*};
}

from_signed!(i8, i16, i32, i64, isize);
from_unsigned!(u8, u16, u32, u64, usize);

impl From<f32> for Value<'_> {
    fn from(v: f32) -> Self {
        Value::F32(v)
    }
}

impl From<f64> for Value<'_> {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}

impl From<Duration> for Value<'_> {
    fn from(v: Duration) -> Self {
        Value::Duration(v)
    }
}

impl From<DateTime<FixedOffset>> for Value<'_> {
    fn from(v: DateTime<FixedOffset>) -> Self {
        Value::Time(v)
    }
}

impl From<DateTime<Utc>> for Value<'_> {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Time(v.fixed_offset())
    }
}

impl<'a> From<&'a [u8]> for Value<'a> {
    fn from(v: &'a [u8]) -> Self {
        Value::Bytes(v)
    }
}

impl<'a> From<&'a [Value<'a>]> for Value<'a> {
    fn from(v: &'a [Value<'a>]) -> Self {
        Value::Array(v)
    }
}

impl<'a, T> From<Option<T>> for Value<'a>
where
    T: Into<Value<'a>>,
{
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// A field key with its escaping verdicts computed up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Key<'a> {
    name: &'a str,
    json: Option<Trusted<'a>>,
    console: Option<Trusted<'a>>,
}

impl<'a> Key<'a> {
    pub fn new(name: &'a str) -> Self {
        Self {
            name,
            json: Trusted::check(Encoding::Json, name),
            console: if name.is_empty() {
                None
            } else {
                Trusted::check(Encoding::Console, name)
            },
        }
    }

    pub fn name(&self) -> &'a str {
        self.name
    }

    /// The key as a scanned-clean string for `encoding`, if it is one.
    pub fn trusted(&self, encoding: Encoding) -> Option<Trusted<'a>> {
        match encoding {
            Encoding::Json => self.json,
            Encoding::Console => self.console,
        }
    }

    /// `true` when the key can be emitted as-is in `encoding`.
    pub fn is_safe(&self, encoding: Encoding) -> bool {
        self.trusted(encoding).is_some()
    }
}

/// A key/value pair.
#[derive(Debug, Clone, Copy)]
pub struct Field<'a> {
    pub key: Key<'a>,
    pub value: Value<'a>,
}

impl<'a> Field<'a> {
    pub fn new(key: &'a str, value: impl Into<Value<'a>>) -> Self {
        Self {
            key: Key::new(key),
            value: value.into(),
        }
    }
}

/// The key an encoder writes for one field.
#[derive(Debug, Clone, Copy)]
pub enum KeyRef<'a> {
    /// Pre-scanned key.
    Known(Key<'a>),
    /// Key taken from a key/value argument list, scanned when written.
    Name(&'a str),
    /// Synthesized `argN` key for an unpaired value.
    Arg(usize),
}

/// Walks a flat `key, value, key, value, ...` argument list.
///
/// A string followed by another element forms a pair. Anything else, such
/// as a trailing unpaired value or a non-string in key position, is emitted
/// under a synthesized `argN` key where N is the zero-based pair index.
pub struct Pairs<'s, 'a> {
    args: &'s [Value<'a>],
    pos: usize,
    pair: usize,
}

impl<'s, 'a> Iterator for Pairs<'s, 'a> {
    type Item = (KeyRef<'a>, &'s Value<'a>);

    fn next(&mut self) -> Option<Self::Item> {
        let first = self.args.get(self.pos)?;
        let index = self.pair;
        self.pair += 1;
        match (first, self.args.get(self.pos + 1)) {
            (Value::Str(key), Some(value)) => {
                self.pos += 2;
                Some((KeyRef::Name(key), value))
            }
            _ => {
                self.pos += 1;
                Some((KeyRef::Arg(index), first))
            }
        }
    }
}

pub fn pairs<'s, 'a>(args: &'s [Value<'a>]) -> Pairs<'s, 'a> {
    Pairs {
        args,
        pos: 0,
        pair: 0,
    }
}

/// Builds a `[Value; N]` from heterogeneous arguments.
///
/// ```
/// use linelog::fields;
/// let args = fields!["port", 8080, "tls", true];
/// assert_eq!(args.len(), 4);
/// ```
#[macro_export]
macro_rules! fields {
    ($($value:expr),* $(,)?) => {
        [$($crate::Value::from($value)),*]
    };
}
