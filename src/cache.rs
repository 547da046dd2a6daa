//! In-memory TTL cache for route sets.
//!
//! Two tiers share this store type: the candidate tier keyed by denom
//! pair, and the ranked tier keyed by denom pair plus the order of
//! magnitude of the input amount, so inputs of similar size share cached
//! rankings. Keys are interned strings; the map is sharded internally and
//! concurrent-safe per key.

use std::time::{Duration, Instant};

use cosmwasm_std::Uint128;
use dashmap::DashMap;

struct Entry<V> {
    value: V,
    /// `None` means the entry never expires.
    expires_at: Option<Instant>,
}

/// Sharded keyed cache with per-entry TTL and lazy expiry on read.
pub struct TtlCache<V> {
    entries: DashMap<String, Entry<V>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Inserts or replaces `key`. A zero `ttl` stores the entry without
    /// expiry.
    pub fn set(&self, key: String, value: V, ttl: Duration) {
        let expires_at = if ttl.is_zero() {
            None
        } else {
            Some(Instant::now() + ttl)
        };
        self.entries.insert(key, Entry { value, expires_at });
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let expired = match self.entries.get(key) {
            None => return None,
            Some(entry) => match entry.expires_at {
                Some(deadline) if Instant::now() >= deadline => true,
                _ => return Some(entry.value.clone()),
            },
        };
        if expired {
            self.entries.remove(key);
        }
        None
    }

    pub fn delete(&self, key: &str) {
        self.entries.remove(key);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

pub fn format_candidate_route_cache_key(token_in_denom: &str, token_out_denom: &str) -> String {
    format!("candidate|{token_in_denom}|{token_out_denom}")
}

pub fn format_ranked_route_cache_key(
    token_in_denom: &str,
    token_out_denom: &str,
    token_in_order_of_magnitude: u32,
) -> String {
    format!("ranked|{token_in_denom}|{token_out_denom}|{token_in_order_of_magnitude}")
}

/// `floor(log10(amount))`; zero amounts bucket at zero.
pub fn order_of_magnitude(amount: Uint128) -> u32 {
    if amount.is_zero() {
        return 0;
    }
    amount.to_string().len() as u32 - 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_delete() {
        let cache: TtlCache<u64> = TtlCache::new();
        cache.set("k".to_string(), 42, Duration::ZERO);
        assert_eq!(cache.get("k"), Some(42));
        cache.delete("k");
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn entries_expire() {
        let cache: TtlCache<u64> = TtlCache::new();
        cache.set("k".to_string(), 1, Duration::from_nanos(1));
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn zero_ttl_never_expires() {
        let cache: TtlCache<u64> = TtlCache::new();
        cache.set("k".to_string(), 1, Duration::ZERO);
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(cache.get("k"), Some(1));
    }

    #[test]
    fn key_formats() {
        assert_eq!(
            format_candidate_route_cache_key("uosmo", "uatom"),
            "candidate|uosmo|uatom"
        );
        assert_eq!(
            format_ranked_route_cache_key("uosmo", "uatom", 6),
            "ranked|uosmo|uatom|6"
        );
    }

    #[test]
    fn order_of_magnitude_buckets() {
        assert_eq!(order_of_magnitude(Uint128::zero()), 0);
        assert_eq!(order_of_magnitude(Uint128::new(9)), 0);
        assert_eq!(order_of_magnitude(Uint128::new(10)), 1);
        assert_eq!(order_of_magnitude(Uint128::new(999)), 2);
        assert_eq!(order_of_magnitude(Uint128::new(1_000_000)), 6);
    }
}
