//! In-memory TTL cache used by the resolvers.
//!
//! Keys are composed from ordered parts joined with [`KEY_SEPARATOR`], so a
//! lookup only hits if the caller supplies the parts in the same order used at
//! insertion. Expired entries are evicted lazily on access.
//!
//! Entries are immutable once written: setting a key that already holds a live
//! value fails unless the caller explicitly asks to overwrite.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Separator placed between key parts
pub const KEY_SEPARATOR: &str = ":";

// =============================================================================
// Errors
// =============================================================================

/// Cache misuse or internal failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// Key already holds a live value and overwrite was not requested
    #[error("Cache key already set: {0}")]
    AlreadySet(String),

    /// No key parts were supplied
    #[error("Cache key must have at least one part")]
    EmptyKey,

    /// A writer panicked while holding the lock
    #[error("Cache lock poisoned")]
    LockPoisoned,
}

// =============================================================================
// Local Cache
// =============================================================================

struct CacheEntry<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

/// Thread-safe key-composite cache with optional per-entry TTL
pub struct LocalCache<V> {
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
    default_ttl: Option<Duration>,
}

impl<V: Clone> LocalCache<V> {
    /// Create a cache. `default_ttl` applies to entries set without an explicit TTL.
    pub fn new(default_ttl: Option<Duration>) -> Self {
        Self { entries: RwLock::new(HashMap::new()), default_ttl }
    }

    /// Create a cache whose entries live for `ttl_ms` milliseconds
    pub fn with_ttl_ms(ttl_ms: u64) -> Self {
        Self::new(Some(Duration::from_millis(ttl_ms)))
    }

    /// Compose a key from its parts
    pub fn key(parts: &[&str]) -> String {
        parts.join(KEY_SEPARATOR)
    }

    /// Store `value` under `parts` with the default TTL, refusing to clobber a live value
    pub fn set(&self, value: V, parts: &[&str]) -> Result<(), CacheError> {
        self.set_with(value, parts, self.default_ttl, false)
    }

    /// Store `value` under `parts` with an explicit TTL and overwrite flag
    pub fn set_with(
        &self,
        value: V,
        parts: &[&str],
        ttl: Option<Duration>,
        overwrite: bool,
    ) -> Result<(), CacheError> {
        if parts.is_empty() {
            return Err(CacheError::EmptyKey);
        }
        let key = Self::key(parts);
        let now = Instant::now();

        let mut entries = self.entries.write().map_err(|_| CacheError::LockPoisoned)?;
        if let Some(existing) = entries.get(&key) {
            if !overwrite && !existing.is_expired(now) {
                return Err(CacheError::AlreadySet(key));
            }
        }
        entries.insert(key, CacheEntry { value, expires_at: ttl.map(|ttl| now + ttl) });
        Ok(())
    }

    /// Look up a live value. An expired entry is evicted and reported as a miss.
    pub fn get(&self, parts: &[&str]) -> Option<V> {
        let key = Self::key(parts);
        let now = Instant::now();

        {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            match entries.get(&key) {
                None => return None,
                Some(entry) if !entry.is_expired(now) => return Some(entry.value.clone()),
                Some(_) => {},
            }
        }

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        // Another caller may have replaced the entry between the two locks
        if entries.get(&key).map(|e| e.is_expired(now)).unwrap_or(false) {
            entries.remove(&key);
            tracing::trace!(key = %key, "Evicted expired cache entry");
        }
        entries.get(&key).map(|e| e.value.clone())
    }

    /// Remove an entry. Returns whether one was present.
    pub fn delete(&self, parts: &[&str]) -> bool {
        let key = Self::key(parts);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(&key).is_some()
    }

    /// Drop every entry
    pub fn clear(&self) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.clear();
    }

    /// Snapshot of all live values
    pub fn values(&self) -> Vec<V> {
        let now = Instant::now();
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.values().filter(|e| !e.is_expired(now)).map(|e| e.value.clone()).collect()
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        let now = Instant::now();
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.values().filter(|e| !e.is_expired(now)).count()
    }

    /// Whether the cache holds no live entry
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// Tests
// =============================================================================
