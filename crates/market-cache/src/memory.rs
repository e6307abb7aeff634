use analysis_core::{AnalysisError, CachePort, DataType};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::CacheTtls;

/// Internal cache entry with timestamp
struct CacheEntry {
    payload: String,
    cached_at: DateTime<Utc>,
}

/// In-process cache. Entries past their domain's TTL are dropped on read.
pub struct MemoryCache {
    entries: DashMap<(DataType, String), CacheEntry>,
    ttls: CacheTtls,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::with_ttls(CacheTtls::default())
    }

    pub fn with_ttls(ttls: CacheTtls) -> Self {
        Self {
            entries: DashMap::new(),
            ttls,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        let now = Utc::now();
        self.entries
            .retain(|(data_type, _), entry| self.is_fresh(*data_type, entry, now));
        before.saturating_sub(self.entries.len())
    }

    fn is_fresh(&self, data_type: DataType, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        match (now - entry.cached_at).to_std() {
            Ok(age) => age < self.ttls.ttl(data_type),
            // Clock went backwards; keep the entry
            Err(_) => true,
        }
    }
}

#[async_trait]
impl CachePort for MemoryCache {
    async fn get(&self, data_type: DataType, key: &str) -> Result<Option<String>, AnalysisError> {
        let map_key = (data_type, key.to_string());
        let expired = match self.entries.get(&map_key) {
            Some(entry) if self.is_fresh(data_type, &entry, Utc::now()) => {
                return Ok(Some(entry.payload.clone()));
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(&map_key);
        }
        Ok(None)
    }

    async fn set(&self, data_type: DataType, key: &str, payload: String) -> Result<(), AnalysisError> {
        self.entries.insert(
            (data_type, key.to_string()),
            CacheEntry {
                payload,
                cached_at: Utc::now(),
            },
        );
        Ok(())
    }
}
