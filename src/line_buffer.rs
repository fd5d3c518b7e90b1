//! Pooled line buffers with inline literal caches.
//!
//! Each log call borrows one [`LineBuffer`] from a process-wide pool, renders
//! the whole line into it and hands it back. Capacity survives the round
//! trip, so a warmed-up process formats lines without touching the heap.
//!
//! Formatting floats, durations and timestamps is the most expensive thing a
//! line does, and the same values repeat constantly (a fixed timeout, a
//! ratio, the current second). The buffer keeps tiny content-addressed caches
//! for them: a hit copies previously formatted bytes instead of formatting
//! again. Keys are complete (raw float bits, full duration, instant plus
//! offset plus layout), so an entry can never describe a different value and
//! those caches survive pooling. The boolean and null slots hold rendered
//! tokens that depend on the logger's styling, so they are cleared on release.

use std::fmt;
use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};
use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use lazy_static::lazy_static;
use parking_lot::Mutex;

use crate::escape;
use crate::scanner::{self, Encoding};
use crate::time_cache::TimeLayout;

/// Capacity of a freshly allocated buffer.
pub const DEFAULT_CAPACITY: usize = 512;

/// Buffers that grew past this are dropped on release instead of pooled.
pub const MAX_POOLED_CAPACITY: usize = 64 * 1024;

/// In auto-flush mode a line is written out early once it grows past this.
pub const AUTO_FLUSH_THRESHOLD: usize = 8 * 1024;

/// Upper bound on idle buffers kept by the pool.
const MAX_POOLED_BUFFERS: usize = 64;

const FLOAT_SLOTS: usize = 4;
const DURATION_SLOTS: usize = 4;
const TIME_SLOTS: usize = 4;
const LITERAL_BYTES: usize = 48;
/// Longest duration text: `5124095576030431h59m59.999999999s`.
const DURATION_BYTES: usize = 40;

/// Destination of committed lines.
///
/// The buffer does no I/O of its own; whoever owns the output decides what a
/// write means. Implementations must write the slice as one unit.
pub trait LineSink {
    fn write_line(&self, line: &[u8]);
}

/// Fixed-capacity byte string stored inline.
#[derive(Clone, Copy)]
struct Inline<const N: usize> {
    bytes: [u8; N],
    len: u8,
}

impl<const N: usize> Inline<N> {
    fn new(src: &[u8]) -> Option<Self> {
        if src.len() > N || src.len() > u8::MAX as usize {
            return None;
        }
        let mut bytes = [0u8; N];
        bytes[..src.len()].copy_from_slice(src);
        Some(Self {
            bytes,
            len: src.len() as u8,
        })
    }

    fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }
}

/// Stack scratch used to format a value before it is cached.
struct Stack<const N: usize> {
    bytes: [u8; N],
    len: usize,
    overflow: bool,
}

impl<const N: usize> Stack<N> {
    fn new() -> Self {
        Self {
            bytes: [0u8; N],
            len: 0,
            overflow: false,
        }
    }

    fn push(&mut self, src: &[u8]) {
        if self.len + src.len() > N {
            self.overflow = true;
            return;
        }
        self.bytes[self.len..self.len + src.len()].copy_from_slice(src);
        self.len += src.len();
    }

    fn as_slice(&self) -> Option<&[u8]> {
        if self.overflow {
            None
        } else {
            Some(&self.bytes[..self.len])
        }
    }
}

impl<const N: usize> fmt::Write for Stack<N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.push(s.as_bytes());
        if self.overflow {
            Err(fmt::Error)
        } else {
            Ok(())
        }
    }
}

/// `fmt::Write` over a byte vector.
pub struct VecWriter<'a>(pub &'a mut Vec<u8>);

impl fmt::Write for VecWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.extend_from_slice(s.as_bytes());
        Ok(())
    }
}

#[derive(Clone, Copy)]
struct Slot<K, const N: usize> {
    key: K,
    value: Inline<N>,
}

/// Small round-robin cache keyed by the complete identity of a value.
struct SlotCache<K, const S: usize, const N: usize> {
    slots: [Option<Slot<K, N>>; S],
    next: usize,
}

impl<K: Copy + PartialEq, const S: usize, const N: usize> SlotCache<K, S, N> {
    fn new() -> Self {
        Self {
            slots: [None; S],
            next: 0,
        }
    }

    fn get(&self, key: &K) -> Option<&[u8]> {
        self.slots
            .iter()
            .flatten()
            .find(|slot| slot.key == *key)
            .map(|slot| slot.value.as_slice())
    }

    fn put(&mut self, key: K, value: &[u8]) {
        if let Some(value) = Inline::new(value) {
            self.slots[self.next] = Some(Slot { key, value });
            self.next = (self.next + 1) % S;
        }
    }

    #[cfg(test)]
    fn clear(&mut self) {
        self.slots = [None; S];
        self.next = 0;
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
struct FloatKey {
    bits: u64,
    wide: bool,
}

#[derive(Clone, Copy, PartialEq, Eq)]
struct DurationKey {
    secs: u64,
    nanos: u32,
}

#[derive(Clone, Copy, PartialEq, Eq)]
struct TimeKey {
    secs: i64,
    nanos: u32,
    offset: i32,
    layout: u64,
}

/// A reusable, growable line buffer.
pub struct LineBuffer {
    bytes: Vec<u8>,
    scratch: Vec<u8>,
    last_line_len: usize,
    flushed: usize,
    auto_flush: bool,
    hits: u64,
    floats: SlotCache<FloatKey, FLOAT_SLOTS, 32>,
    durations: SlotCache<DurationKey, DURATION_SLOTS, DURATION_BYTES>,
    times: SlotCache<TimeKey, TIME_SLOTS, 64>,
    bools: [Option<Inline<LITERAL_BYTES>>; 2],
    null: Option<Inline<LITERAL_BYTES>>,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl LineBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
            scratch: Vec::new(),
            last_line_len: 0,
            flushed: 0,
            auto_flush: false,
            hits: 0,
            floats: SlotCache::new(),
            durations: SlotCache::new(),
            times: SlotCache::new(),
            bools: [None; 2],
            null: None,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.bytes.capacity()
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Direct access for encoders that append through [`escape`].
    #[inline]
    pub fn bytes_mut(&mut self) -> &mut Vec<u8> {
        &mut self.bytes
    }

    /// Length of the last committed line, used as the next line's size hint.
    pub fn size_hint(&self) -> usize {
        self.last_line_len
    }

    /// Number of cache hits served since the buffer was created.
    pub fn cache_hits(&self) -> u64 {
        self.hits
    }

    pub fn set_auto_flush(&mut self, enabled: bool) {
        self.auto_flush = enabled;
    }

    /// Ensures room for `additional` more bytes, at least doubling capacity
    /// but never doubling past [`MAX_POOLED_CAPACITY`] unless the line
    /// itself needs more.
    #[inline]
    pub fn reserve(&mut self, additional: usize) {
        let need = self.bytes.len() + additional;
        let cap = self.bytes.capacity();
        if need <= cap {
            return;
        }
        let doubled = (cap * 2).min(MAX_POOLED_CAPACITY);
        let target = doubled.max(need);
        self.bytes.reserve_exact(target - self.bytes.len());
    }

    #[inline]
    pub fn push(&mut self, b: u8) {
        self.reserve(1);
        self.bytes.push(b);
    }

    #[inline]
    pub fn push_str(&mut self, s: &str) {
        self.push_bytes(s.as_bytes());
    }

    #[inline]
    pub fn push_bytes(&mut self, b: &[u8]) {
        self.reserve(b.len());
        self.bytes.extend_from_slice(b);
    }

    pub fn push_u64(&mut self, mut v: u64) {
        let mut digits = [0u8; 20];
        let mut i = digits.len();
        loop {
            i -= 1;
            digits[i] = b'0' + (v % 10) as u8;
            v /= 10;
            if v == 0 {
                break;
            }
        }
        self.push_bytes(&digits[i..]);
    }

    pub fn push_i64(&mut self, v: i64) {
        if v < 0 {
            self.push(b'-');
        }
        self.push_u64(v.unsigned_abs());
    }

    /// Appends `s` as a quoted JSON string, reserving for the common case up front.
    pub fn push_json_str(&mut self, s: &str) {
        self.reserve(s.len() + 2);
        escape::append_json_str(&mut self.bytes, s);
    }

    /// Appends `s` as a console value, quoting only when needed.
    pub fn push_console_str(&mut self, s: &str) {
        self.reserve(s.len() + 2);
        escape::append_console_str(&mut self.bytes, s);
    }

    pub fn push_str_as(&mut self, encoding: Encoding, s: &str) {
        match encoding {
            Encoding::Json => self.push_json_str(s),
            Encoding::Console => self.push_console_str(s),
        }
    }

    /// Appends a finite `f64` in shortest round-trip form.
    pub fn push_f64(&mut self, v: f64) {
        let key = FloatKey {
            bits: v.to_bits(),
            wide: true,
        };
        if let Some(hit) = self.floats.get(&key) {
            self.hits += 1;
            self.bytes.extend_from_slice(hit);
            return;
        }
        let mut out = Stack::<32>::new();
        write_float(&mut out, v, v.abs());
        self.store_float(key, &out, v);
    }

    /// Appends a finite `f32` in shortest round-trip form for its own width.
    pub fn push_f32(&mut self, v: f32) {
        let key = FloatKey {
            bits: v.to_bits() as u64,
            wide: false,
        };
        if let Some(hit) = self.floats.get(&key) {
            self.hits += 1;
            self.bytes.extend_from_slice(hit);
            return;
        }
        let mut out = Stack::<32>::new();
        write_float(&mut out, v, v.abs() as f64);
        self.store_float(key, &out, v as f64);
    }

    fn store_float(&mut self, key: FloatKey, out: &Stack<32>, v: f64) {
        match out.as_slice() {
            Some(formatted) => {
                self.floats.put(key, formatted);
                self.push_bytes(formatted);
            }
            None => {
                use fmt::Write as _;
                let _ = write!(VecWriter(&mut self.bytes), "{v}");
            }
        }
    }

    /// Appends a duration in `1h2m3.5s` form.
    pub fn push_duration(&mut self, d: Duration) {
        let key = DurationKey {
            secs: d.as_secs(),
            nanos: d.subsec_nanos(),
        };
        if let Some(hit) = self.durations.get(&key) {
            self.hits += 1;
            self.bytes.extend_from_slice(hit);
            return;
        }
        let mut out = Stack::<DURATION_BYTES>::new();
        write_duration(&mut out, d);
        if let Some(formatted) = out.as_slice() {
            self.durations.put(key, formatted);
            self.push_bytes(formatted);
        }
    }

    /// Appends `dt` formatted with `layout`, without quoting.
    pub fn push_time(&mut self, dt: &DateTime<FixedOffset>, layout: &TimeLayout) {
        let key = TimeKey {
            secs: dt.timestamp(),
            nanos: dt.timestamp_subsec_nanos(),
            offset: dt.offset().local_minus_utc(),
            layout: layout.id(),
        };
        if let Some(hit) = self.times.get(&key) {
            self.hits += 1;
            self.bytes.extend_from_slice(hit);
            return;
        }
        let start = self.bytes.len();
        layout.format_into(dt, &mut self.bytes);
        self.times.put(key, &self.bytes[start..]);
    }

    /// Appends a boolean literal rendered by `render`, reusing the rendering
    /// for the rest of this buffer's checkout.
    pub fn push_bool_with(&mut self, v: bool, render: impl FnOnce(&mut Vec<u8>, bool)) {
        let slot = v as usize;
        if let Some(hit) = self.bools[slot] {
            self.hits += 1;
            self.push_bytes(hit.as_slice());
            return;
        }
        let start = self.bytes.len();
        render(&mut self.bytes, v);
        self.bools[slot] = Inline::new(&self.bytes[start..]);
    }

    /// Appends a null literal rendered by `render`; see [`Self::push_bool_with`].
    pub fn push_null_with(&mut self, render: impl FnOnce(&mut Vec<u8>)) {
        if let Some(hit) = self.null {
            self.hits += 1;
            self.push_bytes(hit.as_slice());
            return;
        }
        let start = self.bytes.len();
        render(&mut self.bytes);
        self.null = Inline::new(&self.bytes[start..]);
    }

    /// Formats something into the scratch area, then lets `emit` copy or
    /// escape it into the line. Scratch capacity is kept across uses.
    pub fn with_scratch(
        &mut self,
        fill: impl FnOnce(&mut Vec<u8>),
        emit: impl FnOnce(&mut Vec<u8>, &[u8]),
    ) {
        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.clear();
        fill(&mut scratch);
        emit(&mut self.bytes, &scratch);
        self.scratch = scratch;
    }

    /// Turns everything appended since `start` into a string value for
    /// `encoding`, quoting and escaping in place when needed.
    pub fn quote_since(&mut self, start: usize, encoding: Encoding) {
        let tail_len = self.bytes.len() - start;
        let clean = scanner::first_unsafe_index(encoding, &self.bytes[start..]) == tail_len;
        match encoding {
            Encoding::Json if clean => {
                self.bytes.insert(start, b'"');
                self.push(b'"');
            }
            Encoding::Console if clean && tail_len > 0 => {}
            _ => {
                let mut scratch = std::mem::take(&mut self.scratch);
                scratch.clear();
                scratch.extend_from_slice(&self.bytes[start..]);
                self.bytes.truncate(start);
                escape::append_bytes(&mut self.bytes, encoding, &scratch);
                self.scratch = scratch;
            }
        }
    }

    /// Writes the pending bytes early if auto-flush is on and the line has
    /// outgrown [`AUTO_FLUSH_THRESHOLD`].
    pub fn maybe_flush(&mut self, sink: &dyn LineSink) {
        if self.auto_flush && self.bytes.len() >= AUTO_FLUSH_THRESHOLD {
            sink.write_line(&self.bytes);
            self.flushed += self.bytes.len();
            self.bytes.clear();
        }
    }

    /// Writes the line to `sink` and records its length as the next size hint.
    /// Does nothing for an empty buffer.
    pub fn commit(&mut self, sink: &dyn LineSink) {
        if self.bytes.is_empty() {
            return;
        }
        sink.write_line(&self.bytes);
        self.last_line_len = self.flushed + self.bytes.len();
        self.flushed = 0;
        self.bytes.clear();
    }

    /// Drops the pending line without writing it.
    pub fn discard(&mut self) {
        self.bytes.clear();
        self.flushed = 0;
    }

    fn reset_for_reuse(&mut self) {
        self.bytes.clear();
        self.flushed = 0;
        self.auto_flush = false;
        self.bools = [None; 2];
        self.null = None;
        if self.bytes.capacity() > MAX_POOLED_CAPACITY {
            self.bytes = Vec::with_capacity(DEFAULT_CAPACITY);
            self.last_line_len = 0;
        }
        if self.scratch.capacity() > MAX_POOLED_CAPACITY {
            self.scratch = Vec::new();
        }
    }

    #[cfg(test)]
    fn clear_value_caches(&mut self) {
        self.floats.clear();
        self.durations.clear();
        self.times.clear();
    }
}

/// Shortest round-trip float text, switching to exponent form outside
/// `[1e-6, 1e21)` so huge or tiny values stay compact. Output is valid JSON.
fn write_float<T: fmt::Display + fmt::LowerExp, const N: usize>(
    out: &mut Stack<N>,
    v: T,
    magnitude: f64,
) {
    use fmt::Write as _;
    if magnitude != 0.0 && !(1e-6..1e21).contains(&magnitude) {
        let _ = write!(out, "{v:e}");
    } else {
        let _ = write!(out, "{v}");
    }
}

/// Formats a duration the way Go's `time.Duration` prints: `0s`, `750ns`,
/// `1.5µs`, `250ms`, `3.2s`, `1m0s`, `2h45m10.5s`.
fn write_duration<const N: usize>(out: &mut Stack<N>, d: Duration) {
    let nanos = d.as_nanos();
    if nanos == 0 {
        out.push(b"0s");
        return;
    }
    if nanos < 1_000_000_000 {
        let (unit, prec): (&[u8], u32) = if nanos < 1_000 {
            (b"ns", 0)
        } else if nanos < 1_000_000 {
            ("µs".as_bytes(), 3)
        } else {
            (b"ms", 6)
        };
        write_fraction(out, nanos as u64, prec);
        out.push(unit);
        return;
    }
    let secs = d.as_secs();
    let hours = secs / 3600;
    let minutes = (secs / 60) % 60;
    let seconds = secs % 60;
    if hours > 0 {
        write_uint(out, hours);
        out.push(b"h");
    }
    if hours > 0 || minutes > 0 {
        write_uint(out, minutes);
        out.push(b"m");
    }
    write_fraction(out, seconds * 1_000_000_000 + d.subsec_nanos() as u64, 9);
    out.push(b"s");
}

/// Writes `v / 10^prec` with its fractional digits, trailing zeros trimmed.
fn write_fraction<const N: usize>(out: &mut Stack<N>, v: u64, prec: u32) {
    let scale = 10u64.pow(prec);
    write_uint(out, v / scale);
    let mut frac = v % scale;
    if frac == 0 {
        return;
    }
    let mut digits = [b'0'; 9];
    let mut width = prec as usize;
    while frac % 10 == 0 {
        frac /= 10;
        width -= 1;
    }
    for i in (0..width).rev() {
        digits[i] = b'0' + (frac % 10) as u8;
        frac /= 10;
    }
    out.push(b".");
    out.push(&digits[..width]);
}

fn write_uint<const N: usize>(out: &mut Stack<N>, mut v: u64) {
    let mut digits = [0u8; 20];
    let mut i = digits.len();
    loop {
        i -= 1;
        digits[i] = b'0' + (v % 10) as u8;
        v /= 10;
        if v == 0 {
            break;
        }
    }
    out.push(&digits[i..]);
}

lazy_static! {
    static ref POOL: Mutex<Vec<Box<LineBuffer>>> = Mutex::new(Vec::new());
}

/// A buffer checked out of the pool; returned automatically on drop.
pub struct PooledBuffer {
    inner: ManuallyDrop<Box<LineBuffer>>,
}

impl Deref for PooledBuffer {
    type Target = LineBuffer;

    fn deref(&self) -> &LineBuffer {
        &self.inner
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut LineBuffer {
        &mut self.inner
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        // SAFETY: `inner` is never touched again after this point.
        let buffer = unsafe { ManuallyDrop::take(&mut self.inner) };
        release(buffer);
    }
}

/// Takes a buffer from the pool, allocating one if the pool is empty.
pub fn acquire() -> PooledBuffer {
    let mut buffer = POOL
        .lock()
        .pop()
        .unwrap_or_else(|| Box::new(LineBuffer::default()));
    buffer.bytes.clear();
    let hint = buffer.last_line_len.min(MAX_POOLED_CAPACITY);
    buffer.reserve(hint);
    PooledBuffer {
        inner: ManuallyDrop::new(buffer),
    }
}

fn release(mut buffer: Box<LineBuffer>) {
    buffer.reset_for_reuse();
    let mut pool = POOL.lock();
    if pool.len() < MAX_POOLED_BUFFERS {
        pool.push(buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Collect(RefCell<Vec<Vec<u8>>>);

    impl LineSink for Collect {
        fn write_line(&self, line: &[u8]) {
            self.0.borrow_mut().push(line.to_vec());
        }
    }

    fn text(buf: &LineBuffer) -> &str {
        std::str::from_utf8(buf.as_bytes()).unwrap()
    }

    #[test]
    fn test_integers() {
        let mut buf = LineBuffer::default();
        buf.push_i64(-42);
        buf.push(b' ');
        buf.push_u64(u64::MAX);
        buf.push(b' ');
        buf.push_i64(i64::MIN);
        assert_eq!(text(&buf), "-42 18446744073709551615 -9223372036854775808");
    }

    #[test]
    fn test_floats() {
        let cases: &[(f64, &str)] = &[
            (0.0, "0"),
            (1.5, "1.5"),
            (-2.25, "-2.25"),
            (100.0, "100"),
            (1e21, "1e21"),
            (1.5e-7, "1.5e-7"),
            (0.1, "0.1"),
        ];
        for (v, want) in cases {
            let mut buf = LineBuffer::default();
            buf.push_f64(*v);
            assert_eq!(text(&buf), *want, "formatting {v}");
        }
    }

    #[test]
    fn test_float_cache_matches_fresh_format() {
        let values = [0.1, 3.14159, 2.5e-9, 1.0 / 3.0, 123456.789, -0.0];
        let mut cached = LineBuffer::default();
        for v in values.iter().chain(values.iter()) {
            cached.push_f64(*v);
            cached.push(b',');
        }
        assert!(cached.cache_hits() > 0);

        let mut fresh = LineBuffer::default();
        for v in values.iter().chain(values.iter()) {
            fresh.clear_value_caches();
            fresh.push_f64(*v);
            fresh.push(b',');
        }
        assert_eq!(cached.as_bytes(), fresh.as_bytes());
    }

    #[test]
    fn test_f32_and_f64_do_not_share_slots() {
        let mut buf = LineBuffer::default();
        buf.push_f32(0.1);
        buf.push(b' ');
        buf.push_f64(0.1f32 as f64);
        assert_eq!(text(&buf), "0.1 0.10000000149011612");
    }

    #[test]
    fn test_durations() {
        let cases: &[(Duration, &str)] = &[
            (Duration::ZERO, "0s"),
            (Duration::from_nanos(750), "750ns"),
            (Duration::from_nanos(1_500), "1.5µs"),
            (Duration::from_millis(250), "250ms"),
            (Duration::from_micros(1_250), "1.25ms"),
            (Duration::from_millis(3_200), "3.2s"),
            (Duration::from_secs(60), "1m0s"),
            (Duration::from_secs(3600), "1h0m0s"),
            (Duration::from_millis(9_910_500), "2h45m10.5s"),
            (Duration::MAX, "5124095576030431h0m15.999999999s"),
            (
                Duration::new(5_124_095_576_030_430 * 3600 + 3599, 999_999_999),
                "5124095576030430h59m59.999999999s",
            ),
        ];
        for (d, want) in cases {
            let mut buf = LineBuffer::default();
            buf.push_duration(*d);
            assert_eq!(text(&buf), *want);
        }
    }

    #[test]
    fn test_duration_cache_matches_fresh_format() {
        let d = Duration::from_micros(1_234_567);
        let mut buf = LineBuffer::default();
        buf.push_duration(d);
        buf.push_duration(d);
        assert_eq!(buf.cache_hits(), 1);
        assert_eq!(text(&buf), "1.234567s1.234567s");
    }

    #[test]
    fn test_time_slots_are_keyed_by_layout() {
        use crate::time_cache::{DEFAULT_LAYOUT, TIME_ONLY};

        let full = TimeLayout::parse(DEFAULT_LAYOUT).unwrap();
        let clock = TimeLayout::parse(TIME_ONLY).unwrap();
        let dt = DateTime::parse_from_rfc3339("2024-05-01T12:30:45+02:00").unwrap();

        let mut buf = LineBuffer::default();
        buf.push_time(&dt, &full);
        buf.push(b' ');
        buf.push_time(&dt, &clock);
        assert_eq!(buf.cache_hits(), 0);
        buf.push(b' ');
        buf.push_time(&dt, &full);
        assert_eq!(buf.cache_hits(), 1);

        let want = format!("{} {} {}", full.format(&dt), clock.format(&dt), full.format(&dt));
        assert_eq!(text(&buf), want);
        assert_eq!(want, "2024-05-01T12:30:45+02:00 12:30:45 2024-05-01T12:30:45+02:00");
    }

    #[test]
    fn test_reserve_doubles() {
        let mut buf = LineBuffer::with_capacity(16);
        buf.push_bytes(&[b'x'; 16]);
        buf.reserve(1);
        assert!(buf.capacity() >= 32);
        let mut big = LineBuffer::with_capacity(16);
        big.reserve(100_000);
        assert!(big.capacity() >= 100_000);
    }

    #[test]
    fn test_commit_records_hint() {
        let sink = Collect::default();
        let mut buf = LineBuffer::default();
        buf.commit(&sink);
        assert!(sink.0.borrow().is_empty());

        buf.push_str("hello\n");
        buf.commit(&sink);
        assert_eq!(sink.0.borrow().as_slice(), &[b"hello\n".to_vec()]);
        assert_eq!(buf.size_hint(), 6);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_auto_flush_splits_oversized_lines() {
        let sink = Collect::default();
        let mut buf = LineBuffer::default();
        buf.set_auto_flush(true);
        buf.push_bytes(&vec![b'a'; AUTO_FLUSH_THRESHOLD + 10]);
        buf.maybe_flush(&sink);
        buf.push_str("tail\n");
        buf.commit(&sink);
        let lines = sink.0.borrow();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), AUTO_FLUSH_THRESHOLD + 10);
        assert_eq!(lines[1], b"tail\n");
        assert_eq!(buf.size_hint(), AUTO_FLUSH_THRESHOLD + 15);
    }

    #[test]
    fn test_small_lines_are_not_flushed_early() {
        let sink = Collect::default();
        let mut buf = LineBuffer::default();
        buf.set_auto_flush(true);
        buf.push_str("short");
        buf.maybe_flush(&sink);
        assert!(sink.0.borrow().is_empty());
    }

    #[test]
    fn test_literal_slots_cleared_on_reuse() {
        let mut buf = LineBuffer::default();
        buf.push_bool_with(true, |out, _| out.extend_from_slice(b"<true>"));
        buf.push_bool_with(true, |out, _| out.extend_from_slice(b"never"));
        assert_eq!(text(&buf), "<true><true>");
        buf.reset_for_reuse();
        buf.push_bool_with(true, |out, v| out.extend_from_slice(if v { b"true" } else { b"false" }));
        assert_eq!(text(&buf), "true");
    }

    #[test]
    fn test_oversized_buffer_replaced_on_reuse() {
        let mut buf = LineBuffer::default();
        buf.push_bytes(&vec![0u8; MAX_POOLED_CAPACITY * 2]);
        buf.commit(&Collect::default());
        assert!(buf.capacity() > MAX_POOLED_CAPACITY);
        assert!(buf.size_hint() > MAX_POOLED_CAPACITY);
        buf.reset_for_reuse();
        assert!(buf.capacity() >= DEFAULT_CAPACITY);
        assert!(buf.capacity() < MAX_POOLED_CAPACITY);
        assert_eq!(buf.size_hint(), 0);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_pool_reuses_capacity() {
        {
            let mut buf = acquire();
            buf.push_bytes(&[b'z'; 2000]);
        }
        let buf = acquire();
        assert!(buf.is_empty());
        assert!(buf.capacity() >= DEFAULT_CAPACITY);
    }

    #[test]
    fn test_quote_since() {
        let mut buf = LineBuffer::default();
        buf.push_str("k=");
        buf.push_str("12:00:01");
        buf.quote_since(2, Encoding::Json);
        assert_eq!(text(&buf), "k=\"12:00:01\"");

        let mut buf = LineBuffer::default();
        buf.push_str("k=");
        buf.push_str("Mon Jan 2");
        buf.quote_since(2, Encoding::Console);
        assert_eq!(text(&buf), "k=\"Mon Jan 2\"");

        let mut buf = LineBuffer::default();
        buf.push_str("k=");
        buf.push_str("12:00:01");
        buf.quote_since(2, Encoding::Console);
        assert_eq!(text(&buf), "k=12:00:01");

        let mut buf = LineBuffer::default();
        buf.push_str("k=");
        buf.quote_since(2, Encoding::Console);
        assert_eq!(text(&buf), "k=\"\"");
    }

    #[test]
    fn test_with_scratch() {
        let mut buf = LineBuffer::default();
        buf.with_scratch(
            |scratch| scratch.extend_from_slice(b"a b"),
            |out, s| escape::append_console_str(out, std::str::from_utf8(s).unwrap()),
        );
        assert_eq!(text(&buf), "\"a b\"");
    }
}
