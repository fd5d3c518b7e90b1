//! Unsafe-byte scanning for JSON and console encodings.
//!
//! Every renderer asks the same question before emitting a string: does it
//! contain a byte that must be escaped? The answer is the index of the first
//! such byte, or the length of the input when the string is clean ("trusted").
//!
//! Several backends answer that question:
//!
//! * `Scalar` - one table lookup per byte, the reference implementation
//! * `Swar` - eight bytes at a time in a `u64` using subtract-and-mask tricks
//! * `Sse2` / `Avx2` - 16/32-byte vector compares on x86_64
//! * `Neon` - 16-byte vector compares on aarch64
//!
//! The fastest backend available on the running CPU is selected once, the
//! first time a scan runs. All backends return identical indices for every
//! input; [`scan_with`] exposes each of them so that property can be tested.

use lazy_static::lazy_static;

/// Target encoding of a scan. Console treats space and DEL as unsafe on top
/// of the JSON set, so the two must never share a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    Json,
    Console,
}

/// A scanning implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    Scalar,
    Swar,
    Sse2,
    Avx2,
    Neon,
}

const fn build_table(console: bool) -> [bool; 256] {
    let mut table = [false; 256];
    let mut i = 0;
    while i < 0x20 {
        table[i] = true;
        i += 1;
    }
    table[b'"' as usize] = true;
    table[b'\\' as usize] = true;
    if console {
        table[b' ' as usize] = true;
        table[0x7f] = true;
    }
    table
}

/// Bytes that need escaping inside a JSON string: control characters, `"` and `\`.
pub static JSON_UNSAFE: [bool; 256] = build_table(false);

/// Bytes that force a console value to be quoted: the JSON set plus space and DEL.
pub static CONSOLE_UNSAFE: [bool; 256] = build_table(true);

#[inline(always)]
fn table(encoding: Encoding) -> &'static [bool; 256] {
    match encoding {
        Encoding::Json => &JSON_UNSAFE,
        Encoding::Console => &CONSOLE_UNSAFE,
    }
}

/// Returns `true` if `byte` must be escaped in `encoding`.
#[inline(always)]
pub fn is_unsafe(encoding: Encoding, byte: u8) -> bool {
    table(encoding)[byte as usize]
}

type ScanFn = fn(&[u8]) -> usize;

struct Dispatch {
    backend: Backend,
    json: ScanFn,
    console: ScanFn,
}

lazy_static! {
    static ref DISPATCH: Dispatch = Dispatch::detect();
}

impl Dispatch {
    fn detect() -> Self {
        let backend = best_backend();
        let dispatch = Dispatch {
            backend,
            json: backend_fn(backend, Encoding::Json),
            console: backend_fn(backend, Encoding::Console),
        };
        tracing::debug!(?backend, "selected unsafe-byte scanner");
        dispatch
    }
}

fn best_backend() -> Backend {
    #[cfg(target_arch = "x86_64")]
    {
        if std::is_x86_feature_detected!("avx2") {
            return Backend::Avx2;
        }
        Backend::Sse2
    }

    #[cfg(target_arch = "aarch64")]
    {
        Backend::Neon
    }

    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        Backend::Swar
    }
}

fn backend_fn(backend: Backend, encoding: Encoding) -> ScanFn {
    match (backend, encoding) {
        (Backend::Scalar, Encoding::Json) => scalar::<false>,
        (Backend::Scalar, Encoding::Console) => scalar::<true>,
        (Backend::Swar, Encoding::Json) => swar::<false>,
        (Backend::Swar, Encoding::Console) => swar::<true>,
        #[cfg(target_arch = "x86_64")]
        (Backend::Sse2, Encoding::Json) => x86::sse2::<false>,
        #[cfg(target_arch = "x86_64")]
        (Backend::Sse2, Encoding::Console) => x86::sse2::<true>,
        #[cfg(target_arch = "x86_64")]
        (Backend::Avx2, Encoding::Json) => x86::avx2_entry::<false>,
        #[cfg(target_arch = "x86_64")]
        (Backend::Avx2, Encoding::Console) => x86::avx2_entry::<true>,
        #[cfg(target_arch = "aarch64")]
        (Backend::Neon, Encoding::Json) => arm::neon::<false>,
        #[cfg(target_arch = "aarch64")]
        (Backend::Neon, Encoding::Console) => arm::neon::<true>,
        // Backends that do not exist on this target degrade to SWAR.
        (_, Encoding::Json) => swar::<false>,
        (_, Encoding::Console) => swar::<true>,
    }
}

/// The backend chosen for this process.
pub fn backend() -> Backend {
    DISPATCH.backend
}

/// Backends that can run on this CPU, scalar first.
pub fn available_backends() -> Vec<Backend> {
    let mut backends = vec![Backend::Scalar, Backend::Swar];
    #[cfg(target_arch = "x86_64")]
    {
        backends.push(Backend::Sse2);
        if std::is_x86_feature_detected!("avx2") {
            backends.push(Backend::Avx2);
        }
    }
    #[cfg(target_arch = "aarch64")]
    backends.push(Backend::Neon);
    backends
}

/// Index of the first byte of `s` that must be escaped, or `s.len()`.
#[inline]
pub fn first_unsafe_index(encoding: Encoding, s: &[u8]) -> usize {
    match encoding {
        Encoding::Json => (DISPATCH.json)(s),
        Encoding::Console => (DISPATCH.console)(s),
    }
}

#[inline]
pub fn first_unsafe_json(s: &[u8]) -> usize {
    (DISPATCH.json)(s)
}

#[inline]
pub fn first_unsafe_console(s: &[u8]) -> usize {
    (DISPATCH.console)(s)
}

/// `true` when `s` can be emitted without escaping.
#[inline]
pub fn is_trusted(encoding: Encoding, s: &[u8]) -> bool {
    first_unsafe_index(encoding, s) == s.len()
}

/// Runs a specific backend. A backend that is unavailable on this CPU falls
/// back to SWAR, so callers should consult [`available_backends`] first.
pub fn scan_with(backend: Backend, encoding: Encoding, s: &[u8]) -> usize {
    backend_fn(backend, encoding)(s)
}

#[inline(always)]
fn scan_tail<const CONSOLE: bool>(s: &[u8], from: usize) -> usize {
    let table = if CONSOLE { &CONSOLE_UNSAFE } else { &JSON_UNSAFE };
    let mut i = from;
    while i < s.len() {
        if table[s[i] as usize] {
            return i;
        }
        i += 1;
    }
    s.len()
}

fn scalar<const CONSOLE: bool>(s: &[u8]) -> usize {
    scan_tail::<CONSOLE>(s, 0)
}

const LO: u64 = 0x0101_0101_0101_0101;
const HI: u64 = 0x8080_8080_8080_8080;

#[inline(always)]
const fn repeat(b: u8) -> u64 {
    LO * b as u64
}

/// High bit set in every lane that is zero. Lanes above the first true zero
/// may be falsely flagged by the borrow; lanes below it never are.
#[inline(always)]
const fn has_zero(v: u64) -> u64 {
    v.wrapping_sub(LO) & !v & HI
}

/// High bit set in every lane whose byte is below `n` (`n <= 0x80`).
#[inline(always)]
const fn has_less(v: u64, n: u8) -> u64 {
    v.wrapping_sub(repeat(n)) & !v & HI
}

/// Flags lanes that may hold an unsafe byte. Bytes >= 0x80 are flagged too:
/// they are safe, but they belong to multi-byte sequences and are cheaper to
/// settle with the table than to exclude here.
#[inline(always)]
fn swar_mask<const CONSOLE: bool>(word: u64) -> u64 {
    let mut mask = word & HI;
    mask |= has_zero(word ^ repeat(b'"'));
    mask |= has_zero(word ^ repeat(b'\\'));
    if CONSOLE {
        mask |= has_less(word, 0x21);
        mask |= has_zero(word ^ repeat(0x7f));
    } else {
        mask |= has_less(word, 0x20);
    }
    mask
}

fn swar<const CONSOLE: bool>(s: &[u8]) -> usize {
    let table = if CONSOLE { &CONSOLE_UNSAFE } else { &JSON_UNSAFE };
    let mut i = 0;
    while i + 8 <= s.len() {
        let mut lane = [0u8; 8];
        lane.copy_from_slice(&s[i..i + 8]);
        let mask = swar_mask::<CONSOLE>(u64::from_le_bytes(lane));
        if mask != 0 {
            let start = (mask.trailing_zeros() / 8) as usize;
            for j in start..8 {
                if table[s[i + j] as usize] {
                    return i + j;
                }
            }
        }
        i += 8;
    }
    scan_tail::<CONSOLE>(s, i)
}

#[cfg(target_arch = "x86_64")]
mod x86 {
    use std::arch::x86_64::*;

    use super::scan_tail;

    /// Lanes `<= limit`, compared unsigned via `min`.
    #[inline(always)]
    unsafe fn le_128(v: __m128i, limit: u8) -> __m128i {
        let l = _mm_set1_epi8(limit as i8);
        _mm_cmpeq_epi8(_mm_min_epu8(v, l), v)
    }

    #[inline(always)]
    unsafe fn mask_128<const CONSOLE: bool>(v: __m128i) -> u32 {
        let quote = _mm_cmpeq_epi8(v, _mm_set1_epi8(b'"' as i8));
        let slash = _mm_cmpeq_epi8(v, _mm_set1_epi8(b'\\' as i8));
        let mut hit = _mm_or_si128(quote, slash);
        if CONSOLE {
            hit = _mm_or_si128(hit, le_128(v, 0x20));
            hit = _mm_or_si128(hit, _mm_cmpeq_epi8(v, _mm_set1_epi8(0x7f)));
        } else {
            hit = _mm_or_si128(hit, le_128(v, 0x1f));
        }
        _mm_movemask_epi8(hit) as u32
    }

    pub(super) fn sse2<const CONSOLE: bool>(s: &[u8]) -> usize {
        let mut i = 0;
        // SAFETY: SSE2 is part of the x86_64 baseline and every load reads
        // 16 bytes that lie inside `s`.
        unsafe {
            while i + 16 <= s.len() {
                let v = _mm_loadu_si128(s.as_ptr().add(i) as *const __m128i);
                let mask = mask_128::<CONSOLE>(v);
                if mask != 0 {
                    return i + mask.trailing_zeros() as usize;
                }
                i += 16;
            }
        }
        super::swar_from::<CONSOLE>(s, i)
    }

    #[target_feature(enable = "avx2")]
    #[inline]
    unsafe fn le_256(v: __m256i, limit: u8) -> __m256i {
        let l = _mm256_set1_epi8(limit as i8);
        _mm256_cmpeq_epi8(_mm256_min_epu8(v, l), v)
    }

    #[target_feature(enable = "avx2")]
    unsafe fn avx2<const CONSOLE: bool>(s: &[u8]) -> usize {
        let mut i = 0;
        while i + 32 <= s.len() {
            let v = _mm256_loadu_si256(s.as_ptr().add(i) as *const __m256i);
            let quote = _mm256_cmpeq_epi8(v, _mm256_set1_epi8(b'"' as i8));
            let slash = _mm256_cmpeq_epi8(v, _mm256_set1_epi8(b'\\' as i8));
            let mut hit = _mm256_or_si256(quote, slash);
            if CONSOLE {
                hit = _mm256_or_si256(hit, le_256(v, 0x20));
                hit = _mm256_or_si256(hit, _mm256_cmpeq_epi8(v, _mm256_set1_epi8(0x7f)));
            } else {
                hit = _mm256_or_si256(hit, le_256(v, 0x1f));
            }
            let mask = _mm256_movemask_epi8(hit) as u32;
            if mask != 0 {
                return i + mask.trailing_zeros() as usize;
            }
            i += 32;
        }
        while i + 16 <= s.len() {
            let v = _mm_loadu_si128(s.as_ptr().add(i) as *const __m128i);
            let mask = mask_128::<CONSOLE>(v);
            if mask != 0 {
                return i + mask.trailing_zeros() as usize;
            }
            i += 16;
        }
        scan_tail::<CONSOLE>(s, i)
    }

    pub(super) fn avx2_entry<const CONSOLE: bool>(s: &[u8]) -> usize {
        if std::is_x86_feature_detected!("avx2") {
            // SAFETY: guarded by the runtime feature check above.
            unsafe { avx2::<CONSOLE>(s) }
        } else {
            sse2::<CONSOLE>(s)
        }
    }
}

#[cfg(target_arch = "aarch64")]
mod arm {
    use std::arch::aarch64::*;

    pub(super) fn neon<const CONSOLE: bool>(s: &[u8]) -> usize {
        let mut i = 0;
        // SAFETY: NEON is mandatory on aarch64 and each load stays inside `s`.
        unsafe {
            let quote = vdupq_n_u8(b'"');
            let slash = vdupq_n_u8(b'\\');
            let ctrl = vdupq_n_u8(if CONSOLE { 0x21 } else { 0x20 });
            let del = vdupq_n_u8(0x7f);
            while i + 16 <= s.len() {
                let v = vld1q_u8(s.as_ptr().add(i));
                let mut hit = vorrq_u8(vceqq_u8(v, quote), vceqq_u8(v, slash));
                hit = vorrq_u8(hit, vcltq_u8(v, ctrl));
                if CONSOLE {
                    hit = vorrq_u8(hit, vceqq_u8(v, del));
                }
                if vmaxvq_u8(hit) != 0 {
                    let end = i + 16;
                    let at = super::scan_tail::<CONSOLE>(&s[..end], i);
                    if at < end {
                        return at;
                    }
                }
                i += 16;
            }
        }
        super::swar_from::<CONSOLE>(s, i)
    }
}

/// SWAR scan starting at `from`, used for the tails of the vector backends.
#[allow(dead_code)]
#[inline(always)]
fn swar_from<const CONSOLE: bool>(s: &[u8], from: usize) -> usize {
    from + swar::<CONSOLE>(&s[from..])
}
