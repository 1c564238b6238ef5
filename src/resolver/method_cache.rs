// Short-TTL memo of the strategy that last worked per content id

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// One remembered strategy
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub content_id: String,
    pub method: String,
    pub recorded_at: Instant,
}

/// Content id -> last working method. Last write wins; expiry is checked on read.
#[derive(Debug)]
pub struct MethodCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MethodCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, content_id: &str) -> Option<String> {
        let mut entries = self.entries.lock();
        let expired = match entries.get(content_id) {
            Some(entry) if entry.recorded_at.elapsed() < self.ttl => {
                return Some(entry.method.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.remove(content_id);
        }
        None
    }

    pub fn put(&self, content_id: &str, method: &str) {
        let entry = CacheEntry {
            content_id: content_id.to_string(),
            method: method.to_string(),
            recorded_at: Instant::now(),
        };
        self.entries.lock().insert(content_id.to_string(), entry);
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Entries currently stored, including ones that expired but were not read yet.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_round_trip_and_expiry() {
        let cache = MethodCache::new(Duration::from_secs(240));
        cache.put("abc", "m4a-stream");
        assert_eq!(cache.get("abc").as_deref(), Some("m4a-stream"));

        tokio::time::advance(Duration::from_secs(239)).await;
        assert_eq!(cache.get("abc").as_deref(), Some("m4a-stream"));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get("abc"), None);
        assert!(cache.is_empty(), "expired entry is evicted on read");
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_write_wins() {
        let cache = MethodCache::new(Duration::from_secs(60));
        cache.put("abc", "pipe-stdout");
        cache.put("abc", "temp-file");

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("abc").as_deref(), Some("temp-file"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rewrite_refreshes_ttl() {
        let cache = MethodCache::new(Duration::from_secs(60));
        cache.put("abc", "direct-url");
        tokio::time::advance(Duration::from_secs(50)).await;
        cache.put("abc", "direct-url");
        tokio::time::advance(Duration::from_secs(50)).await;

        assert_eq!(cache.get("abc").as_deref(), Some("direct-url"));
    }

    #[test]
    fn test_clear() {
        let cache = MethodCache::new(Duration::from_secs(60));
        cache.put("a", "pipe-stdout");
        cache.put("b", "temp-file");
        cache.clear();

        assert!(cache.is_empty());
        assert_eq!(cache.get("a"), None);
    }
}
