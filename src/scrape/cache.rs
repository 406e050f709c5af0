//! Deterministic result cache
//!
//! Bounded LRU mapping with a per-entry TTL, keyed by a 24-hex-char
//! fingerprint of the operation inputs. Entries past their TTL are
//! observationally absent; a successful read promotes the entry to
//! most-recently-used. Failures are never cached (callers only `set`
//! successful results).

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;
use serde_json::Value;
use sha2::{Digest, Sha256};

struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

/// Time- and size-bounded LRU cache
pub struct ResultCache<V> {
    inner: Mutex<LruCache<String, Entry<V>>>,
    ttl: Duration,
}

impl<V: Clone> ResultCache<V> {
    /// Create a cache holding at most `max_size` entries, each valid for `ttl`
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        let cap = NonZeroUsize::new(max_size.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(cap)),
            ttl,
        }
    }

    /// Look up a live entry, promoting it to most-recently-used.
    /// Expired entries are removed and reported absent.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut cache = self.inner.lock();
        match cache.get(key) {
            Some(entry) if entry.inserted_at.elapsed() <= self.ttl => Some(entry.value.clone()),
            Some(_) => {
                cache.pop(key);
                None
            }
            None => None,
        }
    }

    /// Whether a live entry exists for `key` (promotes like `get`)
    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Insert a value as most-recently-used with a fresh timestamp.
    /// Any existing entry for the key is replaced; at capacity the single
    /// least-recently-used entry is evicted.
    pub fn set(&self, key: String, value: V) {
        let mut cache = self.inner.lock();
        cache.pop(&key);
        cache.push(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Remove all entries
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    /// Number of entries currently stored (live or expired-but-unread)
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Derive a deterministic cache key from an operation name and a structured
/// input. Top-level object keys are serialised in lexicographic order, so
/// field order in the caller never changes the key. Returns the first 24 hex
/// characters of the SHA-256 digest.
pub fn cache_key(prefix: &str, input: &Value) -> String {
    let canonical = canonicalize(input);
    let mut hasher = Sha256::new();
    hasher.update(prefix.as_bytes());
    hasher.update(b":");
    hasher.update(canonical.as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..24].to_string()
}

fn canonicalize(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .iter()
                .map(|k| format!("{}:{}", Value::String((*k).clone()), map[*k]))
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_shape() {
        let key = cache_key("scrape", &json!({"url": "https://example.com"}));
        assert_eq!(key.len(), 24);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_key_is_order_insensitive_at_top_level() {
        let a = cache_key("op", &json!({"a": 1, "z": 2}));
        let b = cache_key("op", &json!({"z": 2, "a": 1}));
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_differs_by_prefix_and_value() {
        let base = cache_key("op", &json!({"a": 1}));
        assert_ne!(base, cache_key("other", &json!({"a": 1})));
        assert_ne!(base, cache_key("op", &json!({"a": 2})));
        assert_ne!(base, cache_key("op", &json!({"b": 1})));
    }

    #[test]
    fn test_size_bound_holds() {
        let cache: ResultCache<u32> = ResultCache::new(2, Duration::from_secs(60));
        for i in 0..10 {
            cache.set(format!("k{i}"), i);
        }
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_lru_eviction_order() {
        let cache: ResultCache<&str> = ResultCache::new(2, Duration::from_secs(60));
        cache.set("a".into(), "a");
        cache.set("b".into(), "b");
        cache.set("c".into(), "c");
        assert!(cache.get("a").is_none());
        assert_eq!(cache.get("b"), Some("b"));
        assert_eq!(cache.get("c"), Some("c"));
    }

    #[test]
    fn test_get_promotes_entry() {
        let cache: ResultCache<&str> = ResultCache::new(2, Duration::from_secs(60));
        cache.set("a".into(), "a");
        cache.set("b".into(), "b");
        // Touch a so b becomes the LRU victim
        assert_eq!(cache.get("a"), Some("a"));
        cache.set("c".into(), "c");
        assert_eq!(cache.get("a"), Some("a"));
        assert!(cache.get("b").is_none());
        assert_eq!(cache.get("c"), Some("c"));
    }

    #[test]
    fn test_set_replaces_existing_key() {
        let cache: ResultCache<u32> = ResultCache::new(2, Duration::from_secs(60));
        cache.set("a".into(), 1);
        cache.set("a".into(), 2);
        assert_eq!(cache.get("a"), Some(2));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_ttl_expiry() {
        let cache: ResultCache<u32> = ResultCache::new(4, Duration::from_millis(20));
        cache.set("a".into(), 1);
        assert!(cache.has("a"));
        std::thread::sleep(Duration::from_millis(40));
        assert!(!cache.has("a"));
        assert!(cache.get("a").is_none());
    }

    #[test]
    fn test_clear() {
        let cache: ResultCache<u32> = ResultCache::new(4, Duration::from_secs(60));
        cache.set("a".into(), 1);
        cache.set("b".into(), 2);
        cache.clear();
        assert!(cache.is_empty());
    }
}
