use std::collections::HashMap;

use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// In-process cache with per-entry time-to-live.
///
/// Expired entries are evicted at read time inside the same lock that served
/// the lookup, so a `get` never observes a stale value. Keys are plain
/// strings; namespaced keys (`dossier:42`) can be dropped as a group with
/// [`TtlCache::delete_prefix`].
pub struct TtlCache<V> {
    entries: Mutex<HashMap<String, Entry<V>>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new() -> Self {
        Self { entries: Mutex::new(HashMap::new()) }
    }

    pub async fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub async fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let mut entries = self.entries.lock().await;
        entries.insert(key.into(), Entry { value, expires_at: Instant::now() + ttl });
    }

    pub async fn delete(&self, key: &str) {
        let mut entries = self.entries.lock().await;
        entries.remove(key);
    }

    pub async fn delete_prefix(&self, prefix: &str) {
        let mut entries = self.entries.lock().await;
        entries.retain(|key, _| !key.starts_with(prefix));
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::{self, Duration};

    use super::TtlCache;

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_their_ttl() {
        let cache = TtlCache::new();
        cache.set("dossier:42", "cached".to_string(), Duration::from_secs(60)).await;

        assert_eq!(cache.get("dossier:42").await.as_deref(), Some("cached"));

        time::advance(Duration::from_secs(61)).await;
        assert_eq!(cache.get("dossier:42").await, None);
        // eviction happened inside get
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn get_just_before_expiry_still_hits() {
        let cache = TtlCache::new();
        cache.set("compact_avail", 7u32, Duration::from_secs(1800)).await;

        time::advance(Duration::from_secs(1799)).await;
        assert_eq!(cache.get("compact_avail").await, Some(7));
    }

    #[tokio::test]
    async fn delete_prefix_removes_all_and_only_matching_keys() {
        let cache = TtlCache::new();
        cache.set("holidays:2026-09-01:45", 1u8, Duration::from_secs(86_400)).await;
        cache.set("holidays:2026-10-01:45", 2u8, Duration::from_secs(86_400)).await;
        cache.set("dossier:42", 3u8, Duration::from_secs(60)).await;

        cache.delete_prefix("holidays:").await;

        assert_eq!(cache.get("holidays:2026-09-01:45").await, None);
        assert_eq!(cache.get("holidays:2026-10-01:45").await, None);
        assert_eq!(cache.get("dossier:42").await, Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn set_replaces_value_and_resets_ttl() {
        let cache = TtlCache::new();
        cache.set("k", 1u8, Duration::from_secs(10)).await;
        time::advance(Duration::from_secs(8)).await;
        cache.set("k", 2u8, Duration::from_secs(10)).await;
        time::advance(Duration::from_secs(8)).await;

        assert_eq!(cache.get("k").await, Some(2));
    }
}
