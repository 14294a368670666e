use std::{
    collections::HashMap,
    sync::{
        RwLock,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

struct Entry {
    username: String,
    expires_at: Instant,
    inserted_seq: u64,
}

/// Short-TTL cache mapping bearer tokens to the username Logic resolved them
/// to, so the Gateway's WS upgrade handler validates a token with Logic at
/// most once per TTL window instead of once per request (see the
/// token-validation-caching design note: auth must not be double-RPC'd).
///
/// Entries are evicted lazily on lookup/insert; there is no background
/// sweeper since the working set is bounded by `max_entries`.
pub struct TokenCache {
    entries: RwLock<HashMap<String, Entry>>,
    ttl: Duration,
    max_entries: usize,
    next_seq: AtomicU64,
}

impl TokenCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            max_entries,
            next_seq: AtomicU64::new(0),
        }
    }

    /// Returns the cached username for `token` if present and unexpired.
    pub fn get(&self, token: &str) -> Option<String> {
        let entries = self.entries.read().expect("token cache poisoned");
        let entry = entries.get(token)?;
        if entry.expires_at <= Instant::now() {
            return None;
        }
        Some(entry.username.clone())
    }

    pub fn insert(&self, token: String, username: String) {
        let mut entries = self.entries.write().expect("token cache poisoned");
        if entries.len() >= self.max_entries
            && let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, e)| e.inserted_seq)
                .map(|(k, _)| k.clone())
        {
            entries.remove(&oldest);
        }
        entries.insert(token, Entry {
            username,
            expires_at: Instant::now() + self.ttl,
            inserted_seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
        });
    }

    /// Evict a token immediately, e.g. on explicit logout — the cache must
    /// never serve a validated identity for a token the user revoked.
    pub fn invalidate(&self, token: &str) {
        self.entries.write().expect("token cache poisoned").remove(token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_then_expire() {
        let cache = TokenCache::new(Duration::from_millis(20), 10);
        cache.insert("tok".into(), "alice".into());
        assert_eq!(cache.get("tok"), Some("alice".into()));
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.get("tok"), None);
    }

    #[test]
    fn invalidate_removes_immediately() {
        let cache = TokenCache::new(Duration::from_secs(60), 10);
        cache.insert("tok".into(), "alice".into());
        cache.invalidate("tok");
        assert_eq!(cache.get("tok"), None);
    }

    #[test]
    fn evicts_oldest_when_full() {
        let cache = TokenCache::new(Duration::from_secs(60), 2);
        cache.insert("a".into(), "alice".into());
        cache.insert("b".into(), "bob".into());
        cache.insert("c".into(), "carol".into());
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("c"), Some("carol".into()));
    }
}
