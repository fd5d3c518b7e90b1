//! Time layouts and the self-refreshing timestamp cache.
//!
//! Formatting "now" on every log call is wasteful when the layout only
//! resolves to the second: every line within that second gets the same text.
//! [`TimeCache`] formats once, stores the result, and lets a background
//! thread re-format it on each tick. Readers copy the stored bytes and never
//! format on the calling path.
//!
//! Only layouts that are stable within a second can be cached. Each layout
//! is probed once when parsed (see [`TimeLayout::is_sub_second`]); sub-second
//! layouts are formatted per call through the line buffer's timestamp slots.

use std::collections::hash_map::DefaultHasher;
use std::fmt::Write as _;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, FixedOffset, Local, TimeZone, Utc};
use parking_lot::{Condvar, Mutex, RwLock};

use crate::error::{Error, Result};
use crate::line_buffer::VecWriter;

/// RFC 3339 to the second with numeric offset, e.g. `2024-05-01T12:30:00+02:00`.
pub const DEFAULT_LAYOUT: &str = "%Y-%m-%dT%H:%M:%S%:z";

/// RFC 3339 with milliseconds. Sub-second, so never cached.
pub const RFC3339_MILLIS: &str = "%Y-%m-%dT%H:%M:%S%.3f%:z";

/// Wall-clock time of day, e.g. `12:30:00`.
pub const TIME_ONLY: &str = "%H:%M:%S";

/// Default refresh period of a [`TimeCache`].
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// Source of the current instant. Injectable so tests can drive ticks.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

/// Converts an instant to the zone selected by `utc`.
pub fn in_zone(now: DateTime<Utc>, utc: bool) -> DateTime<FixedOffset> {
    if utc {
        now.fixed_offset()
    } else {
        now.with_timezone(&Local).fixed_offset()
    }
}

/// A parsed strftime-style layout.
pub struct TimeLayout {
    source: String,
    items: Vec<Item<'static>>,
    id: u64,
    sub_second: bool,
}

impl std::fmt::Debug for TimeLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeLayout")
            .field("source", &self.source)
            .field("sub_second", &self.sub_second)
            .finish()
    }
}

impl TimeLayout {
    pub fn parse(layout: &str) -> Result<Self> {
        let items = StrftimeItems::new(layout)
            .parse_to_owned()
            .map_err(|_| Error::TimeLayout {
                layout: layout.to_string(),
            })?;
        let mut hasher = DefaultHasher::new();
        layout.hash(&mut hasher);
        let mut parsed = Self {
            source: layout.to_string(),
            items,
            id: hasher.finish(),
            sub_second: false,
        };
        parsed.sub_second = parsed.probe_sub_second();
        Ok(parsed)
    }

    /// Parses `layout`, falling back to [`DEFAULT_LAYOUT`] when it is invalid.
    pub fn parse_or_default(layout: &str) -> Self {
        match Self::parse(layout) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::warn!(%err, "falling back to default time layout");
                Self::default()
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Stable identity, used to key cached renderings.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// `true` when two instants within the same second can render differently.
    pub fn is_sub_second(&self) -> bool {
        self.sub_second
    }

    pub fn format_into(&self, dt: &DateTime<FixedOffset>, out: &mut Vec<u8>) {
        let _ = write!(VecWriter(out), "{}", dt.format_with_items(self.items.iter()));
    }

    pub fn format(&self, dt: &DateTime<FixedOffset>) -> String {
        let mut out = Vec::new();
        self.format_into(dt, &mut out);
        String::from_utf8_lossy(&out).into_owned()
    }

    /// Formats a fixed instant and the same instant plus one millisecond.
    /// Any difference means the layout shows sub-second precision.
    fn probe_sub_second(&self) -> bool {
        let base = match Utc.with_ymd_and_hms(2006, 1, 2, 15, 4, 5).single() {
            Some(t) => t.fixed_offset(),
            None => return true,
        };
        let later = base + chrono::Duration::milliseconds(1);
        let (mut a, mut b) = (Vec::new(), Vec::new());
        self.format_into(&base, &mut a);
        self.format_into(&later, &mut b);
        a != b
    }
}

impl Default for TimeLayout {
    fn default() -> Self {
        match Self::parse(DEFAULT_LAYOUT) {
            Ok(layout) => layout,
            Err(_) => unreachable!("default layout is valid"),
        }
    }
}

/// Lifecycle of a [`TimeCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CacheState {
    Uninitialized = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl CacheState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => CacheState::Uninitialized,
            1 => CacheState::Running,
            2 => CacheState::Stopping,
            _ => CacheState::Stopped,
        }
    }
}

static NEXT_CACHE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Default)]
struct Signal {
    set: Mutex<bool>,
    cond: Condvar,
}

impl Signal {
    fn raise(&self) {
        *self.set.lock() = true;
        self.cond.notify_all();
    }

    /// Waits until raised or `timeout` passes; returns whether it was raised.
    fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut set = self.set.lock();
        while !*set {
            if self.cond.wait_until(&mut set, deadline).timed_out() {
                break;
            }
        }
        *set
    }
}

/// One formatted "now", refreshed by a background thread.
pub struct TimeCache {
    id: u64,
    layout: Arc<TimeLayout>,
    utc: bool,
    clock: Clock,
    interval: Duration,
    current: RwLock<Vec<u8>>,
    state: AtomicU8,
    stop: Signal,
    done: Signal,
}

impl std::fmt::Debug for TimeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeCache")
            .field("id", &self.id)
            .field("layout", &self.layout.as_str())
            .field("state", &self.state())
            .finish()
    }
}

impl TimeCache {
    /// Starts a cache on the system clock with the default interval.
    /// Returns `None` for sub-second layouts.
    pub fn start(layout: Arc<TimeLayout>, utc: bool) -> Option<Arc<Self>> {
        Self::start_with(layout, utc, REFRESH_INTERVAL, system_clock())
    }

    pub fn start_with(
        layout: Arc<TimeLayout>,
        utc: bool,
        interval: Duration,
        clock: Clock,
    ) -> Option<Arc<Self>> {
        if layout.is_sub_second() {
            tracing::debug!(layout = layout.as_str(), "layout is sub-second, not caching");
            return None;
        }
        let cache = Arc::new(Self {
            id: NEXT_CACHE_ID.fetch_add(1, Ordering::Relaxed),
            layout,
            utc,
            clock,
            interval: interval.max(Duration::from_millis(1)),
            current: RwLock::new(Vec::new()),
            state: AtomicU8::new(CacheState::Uninitialized as u8),
            stop: Signal::default(),
            done: Signal::default(),
        });
        cache.refresh();
        cache
            .state
            .store(CacheState::Running as u8, Ordering::Release);

        let weak = Arc::downgrade(&cache);
        let interval = cache.interval;
        let spawned = thread::Builder::new()
            .name(format!("linelog-time-{}", cache.id))
            .spawn(move || refresh_loop(weak, interval));
        if let Err(err) = spawned {
            tracing::warn!(%err, "could not start timestamp refresher");
            cache.finish();
            return None;
        }
        tracing::debug!(id = cache.id, layout = cache.layout.as_str(), "timestamp cache started");
        Some(cache)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn layout(&self) -> &Arc<TimeLayout> {
        &self.layout
    }

    pub fn state(&self) -> CacheState {
        CacheState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.state() == CacheState::Running
    }

    /// Copies the cached text into `out`. Returns `false` once the cache has
    /// been closed, in which case the caller must format the time itself.
    #[inline]
    pub fn append_current(&self, out: &mut Vec<u8>) -> bool {
        if !self.is_running() {
            return false;
        }
        out.extend_from_slice(&self.current.read());
        true
    }

    /// The cached text, if running.
    pub fn current(&self) -> Option<String> {
        let mut out = Vec::new();
        self.append_current(&mut out)
            .then(|| String::from_utf8_lossy(&out).into_owned())
    }

    /// Re-formats "now" and swaps it in. Called by the refresher on each
    /// tick; exposed so callers can force a tick.
    pub fn refresh(&self) {
        let mut next = Vec::with_capacity(self.current.read().len());
        self.refresh_into(&mut next);
    }

    fn refresh_into(&self, next: &mut Vec<u8>) {
        next.clear();
        let now = in_zone((self.clock)(), self.utc);
        self.layout.format_into(&now, next);
        std::mem::swap(&mut *self.current.write(), next);
    }

    /// Stops the refresher. Idempotent and safe to call concurrently; only
    /// the first call has an effect. Does not wait, see [`Self::wait_stopped`].
    pub fn close(&self) -> bool {
        let stopping = self
            .state
            .compare_exchange(
                CacheState::Running as u8,
                CacheState::Stopping as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if stopping {
            tracing::debug!(id = self.id, "timestamp cache closing");
            self.stop.raise();
        }
        stopping
    }

    /// Waits up to `timeout` for the refresher to exit.
    pub fn wait_stopped(&self, timeout: Duration) -> bool {
        self.done.wait(timeout)
    }

    fn finish(&self) {
        self.state
            .store(CacheState::Stopped as u8, Ordering::Release);
        self.done.raise();
    }

    /// How long to sleep so the next tick lands on an interval boundary.
    fn next_wait(&self) -> Duration {
        let now = (self.clock)();
        let step = self.interval.as_nanos().max(1);
        let into = (now.timestamp_subsec_nanos() as u128
            + (now.timestamp().rem_euclid(86_400) as u128) * 1_000_000_000)
            % step;
        Duration::from_nanos((step - into) as u64)
    }
}

impl Drop for TimeCache {
    fn drop(&mut self) {
        self.stop.raise();
        crate::lifecycle::forget(self.id);
    }
}

fn refresh_loop(weak: Weak<TimeCache>, interval: Duration) {
    let mut spare = Vec::new();
    while let Some(cache) = weak.upgrade() {
        let wait = cache.next_wait().min(interval);
        if cache.stop.wait(wait) {
            cache.finish();
            tracing::debug!(id = cache.id, "timestamp cache stopped");
            return;
        }
        cache.refresh_into(&mut spare);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_detects_sub_second_layouts() {
        assert!(!TimeLayout::parse(DEFAULT_LAYOUT).unwrap().is_sub_second());
        assert!(!TimeLayout::parse(TIME_ONLY).unwrap().is_sub_second());
        assert!(TimeLayout::parse(RFC3339_MILLIS).unwrap().is_sub_second());
        assert!(TimeLayout::parse("%s%.f").unwrap().is_sub_second());
    }

    #[test]
    fn test_invalid_layout_falls_back() {
        assert!(TimeLayout::parse("%Q").is_err());
        assert_eq!(TimeLayout::parse_or_default("%Q").as_str(), DEFAULT_LAYOUT);
    }

    #[test]
    fn test_layout_ids_differ() {
        let a = TimeLayout::parse(DEFAULT_LAYOUT).unwrap();
        let b = TimeLayout::parse(TIME_ONLY).unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.id(), TimeLayout::parse(DEFAULT_LAYOUT).unwrap().id());
    }

    #[test]
    fn test_sub_second_layout_is_not_cached() {
        let layout = Arc::new(TimeLayout::parse(RFC3339_MILLIS).unwrap());
        assert!(TimeCache::start(layout, true).is_none());
    }

    #[test]
    fn test_format_utc() {
        let layout = TimeLayout::parse(DEFAULT_LAYOUT).unwrap();
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        assert_eq!(layout.format(&in_zone(t, true)), "2024-05-01T12:30:00+00:00");
    }

    #[test]
    fn test_close_is_idempotent() {
        let layout = Arc::new(TimeLayout::default());
        let cache = TimeCache::start(layout, true).unwrap();
        assert_eq!(cache.state(), CacheState::Running);
        assert!(cache.close());
        assert!(!cache.close());
        assert!(cache.wait_stopped(Duration::from_secs(2)));
        assert_eq!(cache.state(), CacheState::Stopped);
        assert!(cache.current().is_none());
    }
}
