//! Best-effort expiring cache for resolved posts.
//!
//! Entries expire purely by wall-clock age; there is no invalidation signal
//! from the content API. Expired entries are evicted lazily on lookup, and
//! the map is bounded so a long-running caller cannot grow it without limit.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::config::CacheConfig;
use crate::provider::PostInfo;

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

/// Key → `{ value, expires_at }` map with lazy expiry.
pub struct ExpiringCache<K, V> {
    entries: Mutex<HashMap<K, CacheEntry<V>>>,
    ttl: Duration,
    max_entries: usize,
}

impl<K, V> ExpiringCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    #[must_use]
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    #[must_use]
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(Duration::from_secs(config.ttl_seconds), config.max_entries)
    }

    /// Look up `key`, evicting it if it has expired.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        let expired = match entries.get(key) {
            None => return None,
            Some(entry) => entry.expires_at < now,
        };

        if expired {
            entries.remove(key);
            return None;
        }
        entries.get(key).map(|entry| entry.value.clone())
    }

    /// Insert or replace `key`, restarting its time-to-live.
    pub fn insert(&self, key: K, value: V) {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            entries.retain(|_, entry| entry.expires_at >= now);

            if entries.len() >= self.max_entries {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.expires_at)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                }
            }
        }

        entries.insert(
            key,
            CacheEntry {
                value,
                expires_at: now + self.ttl,
            },
        );
    }

    /// Number of stored entries, including expired ones not yet evicted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Why a shortcode was rejected, as a message key for the caller to render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidPost {
    pub message_key: String,
}

/// What the caller remembers about a shortcode between submissions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedPost {
    pub video_url: Option<String>,
    pub username: Option<String>,
    pub dash_manifest: Option<String>,
    pub invalid: Option<InvalidPost>,
}

impl CachedPost {
    #[must_use]
    pub fn from_post(post: &PostInfo) -> Self {
        Self {
            video_url: post.video_url.clone(),
            username: post.username.clone(),
            dash_manifest: post.eligible_manifest().map(str::to_string),
            invalid: None,
        }
    }

    #[must_use]
    pub fn invalid(message_key: impl Into<String>) -> Self {
        Self {
            invalid: Some(InvalidPost {
                message_key: message_key.into(),
            }),
            ..Self::default()
        }
    }
}

/// Resolution cache keyed by shortcode.
pub type PostCache = ExpiringCache<String, CachedPost>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_lazily() {
        let cache = ExpiringCache::new(Duration::from_secs(300), 8);
        cache.insert("abc".to_string(), 1);

        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(cache.get(&"abc".to_string()), Some(1));

        tokio::time::advance(Duration::from_secs(2)).await;
        // Still stored until the next lookup touches it.
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&"abc".to_string()), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_insert_restarts_ttl() {
        let cache = ExpiringCache::new(Duration::from_secs(10), 8);
        cache.insert("k", "v1");
        tokio::time::advance(Duration::from_secs(8)).await;
        cache.insert("k", "v2");
        tokio::time::advance(Duration::from_secs(8)).await;
        assert_eq!(cache.get(&"k"), Some("v2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_evicts_expired_then_oldest() {
        let cache = ExpiringCache::new(Duration::from_secs(10), 2);
        cache.insert("a", 1);
        tokio::time::advance(Duration::from_secs(11)).await;
        cache.insert("b", 2);
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.insert("c", 3);
        // "a" had expired and made room for "c".
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"a"), None);

        tokio::time::advance(Duration::from_secs(1)).await;
        cache.insert("d", 4);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"b"), None);
        assert_eq!(cache.get(&"c"), Some(3));
        assert_eq!(cache.get(&"d"), Some(4));
    }

    #[test]
    fn test_cached_post_drops_ineligible_manifest() {
        let post = PostInfo {
            video_url: Some("https://cdn.example.com/low.mp4".to_string()),
            username: Some("alice".to_string()),
            dash_manifest: Some("<MPD/>".to_string()),
            is_dash_eligible: false,
        };
        let cached = CachedPost::from_post(&post);
        assert_eq!(cached.video_url.as_deref(), Some("https://cdn.example.com/low.mp4"));
        assert_eq!(cached.dash_manifest, None);
        assert!(cached.invalid.is_none());

        let invalid = CachedPost::invalid("serverErrors.notFound");
        assert_eq!(invalid.invalid.unwrap().message_key, "serverErrors.notFound");
        assert!(invalid.video_url.is_none());
    }
}
