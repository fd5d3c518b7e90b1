//! Ownership of shared background resources.
//!
//! Deriving a logger with `with(...)` shares the parent's timestamp cache, so
//! many logger values can point at one cache. Exactly one of them may tear it
//! down. The registry below maps each cache to the token of its owner: a
//! release succeeds only for the recorded owner, and removing the entry is
//! what makes teardown happen once. The map is guarded by a mutex, so
//! concurrent clone, release and cancellation are race-free.
//!
//! [`Context`] is the cancellation primitive loggers attach to. Cancelling it
//! runs every registered hook exactly once.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use lazy_static::lazy_static;
use parking_lot::Mutex;

use crate::time_cache::TimeCache;

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Identity of the logger instance responsible for releasing a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerToken(u64);

impl OwnerToken {
    pub fn new() -> Self {
        OwnerToken(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for OwnerToken {
    fn default() -> Self {
        Self::new()
    }
}

lazy_static! {
    /// Cache id -> owning token.
    static ref OWNERS: Mutex<HashMap<u64, OwnerToken>> = Mutex::new(HashMap::new());
}

/// Records `owner` as responsible for `cache`. Fails if it already has one.
pub fn claim(cache: &TimeCache, owner: OwnerToken) -> bool {
    let mut owners = OWNERS.lock();
    if owners.contains_key(&cache.id()) {
        return false;
    }
    owners.insert(cache.id(), owner);
    true
}

/// Current owner of `cache`, if it has not been released.
pub fn owner_of(cache: &TimeCache) -> Option<OwnerToken> {
    OWNERS.lock().get(&cache.id()).copied()
}

/// Closes `cache` if `owner` owns it. Returns whether this call did it.
pub fn release(cache: &TimeCache, owner: OwnerToken) -> bool {
    let removed = {
        let mut owners = OWNERS.lock();
        match owners.get(&cache.id()) {
            Some(current) if *current == owner => owners.remove(&cache.id()).is_some(),
            _ => false,
        }
    };
    if removed {
        tracing::debug!(cache = cache.id(), owner = owner.as_u64(), "releasing timestamp cache");
        cache.close();
    }
    removed
}

/// Closes `cache` on behalf of whoever owns it. Used by cancellation, where
/// every derived logger may observe the same signal; only the first call
/// finds an entry to remove.
pub fn release_any(cache: &TimeCache) -> bool {
    let removed = OWNERS.lock().remove(&cache.id()).is_some();
    if removed {
        tracing::debug!(cache = cache.id(), "releasing timestamp cache on cancellation");
        cache.close();
    }
    removed
}

/// Drops the registry entry of a cache that is being destroyed.
pub(crate) fn forget(cache_id: u64) {
    OWNERS.lock().remove(&cache_id);
}

type Hook = Box<dyn FnOnce() + Send>;

struct ContextInner {
    cancelled: AtomicBool,
    hooks: Mutex<Vec<Hook>>,
}

/// A cancellation signal shared by everything attached to it.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ContextInner {
                cancelled: AtomicBool::new(false),
                hooks: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Registers `hook` to run on cancellation. Runs it right away if the
    /// context is already cancelled.
    pub fn on_cancel(&self, hook: impl FnOnce() + Send + 'static) {
        {
            let mut hooks = self.inner.hooks.lock();
            if !self.is_cancelled() {
                hooks.push(Box::new(hook));
                return;
            }
        }
        hook();
    }

    /// Cancels the context. Only the first call runs hooks.
    pub fn cancel(&self) {
        let hooks = {
            let mut hooks = self.inner.hooks.lock();
            if self.inner.cancelled.swap(true, Ordering::AcqRel) {
                return;
            }
            std::mem::take(&mut *hooks)
        };
        for hook in hooks {
            hook();
        }
    }
}
