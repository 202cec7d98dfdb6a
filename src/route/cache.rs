use crate::location::{Location, Route};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_CAPACITY: usize = 256;

/// Start/end pair rounded to 4 decimal places (about 11 m).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RouteKey([i64; 4]);

impl RouteKey {
    pub fn new(start: Location, end: Location) -> Self {
        let round = |degrees: f64| (degrees * 10_000.0).round() as i64;
        Self([
            round(start.lat),
            round(start.lng),
            round(end.lat),
            round(end.lng),
        ])
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    route: Route,
    fetched_at: Instant,
}

/// Time-bounded, size-bounded store of fetched routes.
#[derive(Debug)]
pub struct RouteCache {
    entries: HashMap<RouteKey, CacheEntry>,
    ttl: Duration,
    capacity: usize,
}

impl RouteCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            capacity: capacity.max(1),
        }
    }

    pub fn get(&self, key: &RouteKey, now: Instant) -> Option<Route> {
        self.entries
            .get(key)
            .filter(|entry| now.duration_since(entry.fetched_at) < self.ttl)
            .map(|entry| entry.route.clone())
    }

    pub fn insert(&mut self, key: RouteKey, route: Route, now: Instant) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            self.purge_expired(now);
        }
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.fetched_at)
                .map(|(key, _)| *key);
            if let Some(oldest) = oldest {
                self.entries.remove(&oldest);
            }
        }

        self.entries.insert(
            key,
            CacheEntry {
                route,
                fetched_at: now,
            },
        );
    }

    pub fn purge_expired(&mut self, now: Instant) {
        let ttl = self.ttl;
        self.entries
            .retain(|_, entry| now.duration_since(entry.fetched_at) < ttl);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn route(lat: f64) -> Route {
        Route::from([Location::new(lat, 78.0), Location::new(lat + 0.01, 78.0)])
    }

    #[test]
    fn test_key_rounds_to_four_decimals() {
        let a = RouteKey::new(Location::new(17.42621, 78.45519), Location::new(17.4375, 78.4484));
        let b = RouteKey::new(Location::new(17.42618, 78.45522), Location::new(17.43749, 78.44841));
        let c = RouteKey::new(Location::new(17.4263, 78.4552), Location::new(17.4375, 78.4484));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_entries_expire_after_ttl() {
        let now = Instant::now();
        let mut cache = RouteCache::new(Duration::from_secs(300), 8);
        let key = RouteKey::new(Location::new(1.0, 2.0), Location::new(3.0, 4.0));
        let cached = route(1.0);
        cache.insert(key, cached.clone(), now);

        let hit = cache.get(&key, now + Duration::from_secs(299)).unwrap();
        assert!(Arc::ptr_eq(&hit, &cached));
        assert!(cache.get(&key, now + Duration::from_secs(300)).is_none());
    }

    #[test]
    fn test_full_cache_evicts_oldest() {
        let now = Instant::now();
        let mut cache = RouteCache::new(Duration::from_secs(300), 2);
        let keys: Vec<RouteKey> = (0..3)
            .map(|i| RouteKey::new(Location::new(i as f64, 0.0), Location::new(0.0, 0.0)))
            .collect();

        cache.insert(keys[0], route(0.0), now);
        cache.insert(keys[1], route(1.0), now + Duration::from_secs(1));
        cache.insert(keys[2], route(2.0), now + Duration::from_secs(2));

        assert_eq!(cache.len(), 2);
        let later = now + Duration::from_secs(3);
        assert!(cache.get(&keys[0], later).is_none());
        assert!(cache.get(&keys[1], later).is_some());
        assert!(cache.get(&keys[2], later).is_some());
    }

    #[test]
    fn test_full_cache_prefers_dropping_expired_entries() {
        let now = Instant::now();
        let mut cache = RouteCache::new(Duration::from_secs(10), 2);
        let stale = RouteKey::new(Location::new(0.0, 0.0), Location::new(1.0, 1.0));
        let fresh = RouteKey::new(Location::new(2.0, 2.0), Location::new(3.0, 3.0));
        let newest = RouteKey::new(Location::new(4.0, 4.0), Location::new(5.0, 5.0));

        cache.insert(stale, route(0.0), now);
        cache.insert(fresh, route(2.0), now + Duration::from_secs(8));
        cache.insert(newest, route(4.0), now + Duration::from_secs(12));

        let later = now + Duration::from_secs(13);
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&fresh, later).is_some());
        assert!(cache.get(&newest, later).is_some());
    }
}
