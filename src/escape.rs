//! Escaping of strings for JSON and console output.
//!
//! Both encodings share JSON string syntax once a value is quoted. The only
//! difference is *when* quoting happens: JSON always quotes strings, the
//! console quotes a value only when it holds a console-unsafe byte (or is
//! empty, so the field stays visible).
//!
//! Escaping is skipped entirely for trusted input. A string becomes trusted
//! only after a full scan reports no unsafe byte; see [`Trusted::check`].

use crate::scanner::{self, Encoding};

const HEX: &[u8; 16] = b"0123456789abcdef";

/// A string proven clean for one encoding by a full scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trusted<'a> {
    text: &'a str,
    encoding: Encoding,
}

impl<'a> Trusted<'a> {
    /// Scans `text` and promotes it if no byte needs escaping.
    pub fn check(encoding: Encoding, text: &'a str) -> Option<Self> {
        if scanner::is_trusted(encoding, text.as_bytes()) {
            Some(Trusted { text, encoding })
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'a str {
        self.text
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }
}

/// Short escape for a byte inside a quoted string, if JSON defines one.
#[inline]
fn short_escape(b: u8) -> Option<u8> {
    match b {
        b'"' => Some(b'"'),
        b'\\' => Some(b'\\'),
        0x08 => Some(b'b'),
        0x0c => Some(b'f'),
        b'\n' => Some(b'n'),
        b'\r' => Some(b'r'),
        b'\t' => Some(b't'),
        _ => None,
    }
}

/// Appends the escaped form of a single unsafe byte.
#[inline]
pub fn push_escaped_byte(out: &mut Vec<u8>, b: u8) {
    match short_escape(b) {
        Some(c) => out.extend_from_slice(&[b'\\', c]),
        None => out.extend_from_slice(&[
            b'\\',
            b'u',
            b'0',
            b'0',
            HEX[(b >> 4) as usize],
            HEX[(b & 0xf) as usize],
        ]),
    }
}

/// Appends the body of a quoted string (no surrounding quotes), copying safe
/// runs verbatim. `first` is the index of the first unsafe byte as reported
/// by the scanner for `encoding`; pass `s.len()` when unknown to be clean.
///
/// Inside quotes the console keeps spaces literal, so only the JSON set and
/// DEL are escaped there.
pub fn append_escaped(out: &mut Vec<u8>, encoding: Encoding, s: &[u8], first: usize) {
    out.reserve(s.len() + 8);
    let mut start = 0;
    let mut at = first;
    while at < s.len() {
        let b = s[at];
        let escape = match encoding {
            Encoding::Json => true,
            Encoding::Console => b != b' ',
        };
        if escape {
            out.extend_from_slice(&s[start..at]);
            push_escaped_byte(out, b);
            start = at + 1;
        }
        at += 1;
        at += scanner::first_unsafe_index(encoding, &s[at..]);
    }
    out.extend_from_slice(&s[start..]);
}

/// Appends `s` as a JSON string literal.
#[inline]
pub fn append_json_str(out: &mut Vec<u8>, s: &str) {
    append_json_bytes(out, s.as_bytes());
}

/// Byte form of [`append_json_str`] for text rendered into a scratch buffer.
pub fn append_json_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    let first = scanner::first_unsafe_json(bytes);
    out.push(b'"');
    if first == bytes.len() {
        out.extend_from_slice(bytes);
    } else {
        append_escaped(out, Encoding::Json, bytes, first);
    }
    out.push(b'"');
}

/// Appends a string already proven clean, skipping the scan.
#[inline]
pub fn append_json_trusted(out: &mut Vec<u8>, s: Trusted<'_>) {
    debug_assert_eq!(s.encoding(), Encoding::Json);
    out.push(b'"');
    out.extend_from_slice(s.as_str().as_bytes());
    out.push(b'"');
}

/// Appends `s` as a console value: bare when clean, quoted and escaped otherwise.
#[inline]
pub fn append_console_str(out: &mut Vec<u8>, s: &str) {
    append_console_bytes(out, s.as_bytes());
}

/// Byte form of [`append_console_str`].
pub fn append_console_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    let first = scanner::first_unsafe_console(bytes);
    if first == bytes.len() && !bytes.is_empty() {
        out.extend_from_slice(bytes);
        return;
    }
    out.push(b'"');
    append_escaped(out, Encoding::Console, bytes, first);
    out.push(b'"');
}

/// Appends a console value already proven clean.
#[inline]
pub fn append_console_trusted(out: &mut Vec<u8>, s: Trusted<'_>) {
    debug_assert_eq!(s.encoding(), Encoding::Console);
    if s.as_str().is_empty() {
        out.extend_from_slice(b"\"\"");
    } else {
        out.extend_from_slice(s.as_str().as_bytes());
    }
}

/// Appends `s` in `encoding`, dispatching to the JSON or console form.
#[inline]
pub fn append_str(out: &mut Vec<u8>, encoding: Encoding, s: &str) {
    match encoding {
        Encoding::Json => append_json_str(out, s),
        Encoding::Console => append_console_str(out, s),
    }
}

#[inline]
pub fn append_bytes(out: &mut Vec<u8>, encoding: Encoding, bytes: &[u8]) {
    match encoding {
        Encoding::Json => append_json_bytes(out, bytes),
        Encoding::Console => append_console_bytes(out, bytes),
    }
}
