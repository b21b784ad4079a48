use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use valuation_core::ValuationTable;

pub const DEFAULT_CACHE_TTL_SECS: i64 = 300; // 5 minutes

/// Internal cache entry with timestamp
struct CacheEntry<T> {
    data: T,
    cached_at: DateTime<Utc>,
}

/// Normalized tables keyed by the ordered symbol list (TTL + manual invalidation)
pub struct TableCache {
    entries: DashMap<String, CacheEntry<Arc<ValuationTable>>>,
    ttl: Duration,
}

impl Default for TableCache {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_CACHE_TTL_SECS))
    }
}

impl TableCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Order matters: `[A, B]` and `[B, A]` are different tables.
    pub fn key(symbols: &[String]) -> String {
        symbols.join(",")
    }

    pub fn get(&self, symbols: &[String]) -> Option<Arc<ValuationTable>> {
        let entry = self.entries.get(&Self::key(symbols))?;
        if Utc::now() - entry.cached_at < self.ttl {
            Some(Arc::clone(&entry.data))
        } else {
            None
        }
    }

    /// Replaces any previous entry for the same key.
    pub fn insert(&self, symbols: &[String], table: Arc<ValuationTable>) {
        self.entries.insert(
            Self::key(symbols),
            CacheEntry {
                data: table,
                cached_at: Utc::now(),
            },
        );
    }

    pub fn invalidate(&self, symbols: &[String]) -> bool {
        self.entries.remove(&Self::key(symbols)).is_some()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
