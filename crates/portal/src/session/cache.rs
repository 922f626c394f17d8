//! Durable, TTL-bounded profile cache.
//!
//! Holds a single [`CacheEntry`] under one well-known key: only one user is
//! signed in per process, so there is nothing to evict. Every failure mode
//! (unreadable storage, corrupt JSON, another user's entry, an expired
//! entry) reads as a miss, and write failures are dropped. The cache only
//! ever saves a round-trip; correctness never depends on it.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use examhub_core::{CacheEntry, Profile, UserId};

use crate::storage::KeyValueStore;

/// Storage key of the cache slot.
pub const CACHE_KEY: &str = "examhub.profile_cache";

/// How long a cached profile may be shown without refetching.
pub const CACHE_TTL: Duration = Duration::from_secs(30 * 60);

/// Source of wall-clock time in milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// The system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock(AtomicI64);

impl ManualClock {
    #[must_use]
    pub const fn new(now_ms: i64) -> Self {
        Self(AtomicI64::new(now_ms))
    }

    pub fn advance(&self, by: Duration) {
        let ms = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        self.0.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Single-slot profile cache over a [`KeyValueStore`].
#[derive(Clone)]
pub struct SessionCache {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    ttl_ms: i64,
}

impl SessionCache {
    /// Create a cache using the system clock and the standard TTL.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    /// Create a cache reading time from `clock`.
    #[must_use]
    pub fn with_clock(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            ttl_ms: i64::try_from(CACHE_TTL.as_millis()).unwrap_or(i64::MAX),
        }
    }

    /// The cached profile for `user_id`, if present, owned by that user and fresh.
    #[must_use]
    pub fn get(&self, user_id: &UserId) -> Option<Profile> {
        let entry = self.read_entry()?;
        if entry.is_valid_for(user_id, self.clock.now_ms(), self.ttl_ms) {
            Some(entry.data)
        } else {
            tracing::debug!(user_id = %user_id, "Profile cache miss");
            None
        }
    }

    /// Overwrite the slot with `profile` for `user_id`.
    pub fn set(&self, user_id: &UserId, profile: &Profile) {
        self.write_entry(&CacheEntry {
            data: profile.clone(),
            id: user_id.clone(),
            ts: self.clock.now_ms(),
        });
    }

    /// Expire the slot if it belongs to `user_id`, keeping its payload.
    ///
    /// The slot is rewritten with `ts = 0` rather than deleted, so a reader
    /// racing the sign-out sees an expired entry, never a missing one.
    pub fn invalidate(&self, user_id: &UserId) {
        let Some(mut entry) = self.read_entry() else {
            return;
        };
        if &entry.id != user_id {
            return;
        }
        entry.ts = 0;
        self.write_entry(&entry);
    }

    /// Raw slot contents, without the freshness check.
    #[must_use]
    pub fn peek(&self) -> Option<CacheEntry> {
        self.read_entry()
    }

    fn read_entry(&self) -> Option<CacheEntry> {
        let raw = match self.store.get_item(CACHE_KEY) {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::debug!(error = %e, "Profile cache unreadable");
                return None;
            }
        };
        serde_json::from_str(&raw)
            .inspect_err(|e| tracing::debug!(error = %e, "Profile cache entry corrupt"))
            .ok()
    }

    fn write_entry(&self, entry: &CacheEntry) {
        let encoded = match serde_json::to_string(entry) {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::debug!(error = %e, "Profile cache entry not encodable");
                return;
            }
        };
        if let Err(e) = self.store.set_item(CACHE_KEY, &encoded) {
            tracing::debug!(error = %e, "Profile cache write dropped");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use examhub_core::Role;

    const EPOCH: i64 = 1_760_000_000_000;

    fn cache() -> (SessionCache, Arc<MemoryStore>, Arc<ManualClock>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(EPOCH));
        let cache = SessionCache::with_clock(store.clone(), clock.clone());
        (cache, store, clock)
    }

    fn uid(id: &str) -> UserId {
        UserId::new(id)
    }

    #[test]
    fn test_hit_until_ttl() {
        let (cache, _, clock) = cache();
        let profile = Profile::new("u1", Role::Teacher);
        cache.set(&uid("u1"), &profile);

        assert_eq!(cache.get(&uid("u1")), Some(profile.clone()));
        clock.advance(Duration::from_secs(29 * 60 + 59));
        assert_eq!(cache.get(&uid("u1")), Some(profile));
        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get(&uid("u1")), None);
    }

    #[test]
    fn test_other_user_never_sees_entry() {
        let (cache, _, _) = cache();
        cache.set(&uid("u1"), &Profile::new("u1", Role::Teacher));
        assert_eq!(cache.get(&uid("u2")), None);
    }

    #[test]
    fn test_invalidate_zeroes_timestamp_but_keeps_slot() {
        let (cache, _, _) = cache();
        cache.set(&uid("u1"), &Profile::new("u1", Role::Teacher));
        cache.invalidate(&uid("u1"));

        assert_eq!(cache.get(&uid("u1")), None);
        let entry = cache.peek().unwrap();
        assert_eq!(entry.ts, 0);
        assert_eq!(entry.id, uid("u1"));

        let updated = Profile::new("u1", Role::SchoolAdmin);
        cache.set(&uid("u1"), &updated);
        assert_eq!(cache.get(&uid("u1")), Some(updated));
    }

    #[test]
    fn test_invalidate_other_user_is_noop() {
        let (cache, _, _) = cache();
        let profile = Profile::new("u1", Role::Teacher);
        cache.set(&uid("u1"), &profile);
        cache.invalidate(&uid("u2"));
        assert_eq!(cache.get(&uid("u1")), Some(profile));
    }

    #[test]
    fn test_corrupt_slot_is_a_miss() {
        let (cache, store, _) = cache();
        store.set_item(CACHE_KEY, "{\"data\":").unwrap();
        assert_eq!(cache.get(&uid("u1")), None);
        cache.invalidate(&uid("u1"));
        assert_eq!(store.get_item(CACHE_KEY).unwrap().as_deref(), Some("{\"data\":"));
    }

    #[test]
    fn test_write_failure_is_swallowed() {
        let (cache, store, _) = cache();
        store.set_fail_writes(true);
        cache.set(&uid("u1"), &Profile::new("u1", Role::Teacher));
        assert_eq!(cache.get(&uid("u1")), None);
    }
}
