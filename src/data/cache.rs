//! Bounded, time-aware cache for quote metadata.

use crate::api::StockInfo;
use std::collections::HashMap;
use std::time::{Duration, Instant};

struct Entry {
    info: StockInfo,
    fetched_at: Instant,
}

pub struct MetadataCache {
    entries: HashMap<String, Entry>,
    ttl: Duration,
    capacity: usize,
}

impl MetadataCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            capacity: capacity.max(1),
        }
    }

    /// Live entry for `symbol`; expired entries are dropped on lookup.
    pub fn get(&mut self, symbol: &str) -> Option<StockInfo> {
        let expired = match self.entries.get(symbol) {
            Some(entry) => entry.fetched_at.elapsed() >= self.ttl,
            None => return None,
        };

        if expired {
            self.entries.remove(symbol);
            return None;
        }
        self.entries.get(symbol).map(|entry| entry.info.clone())
    }

    pub fn insert(&mut self, symbol: &str, info: StockInfo) {
        if !self.entries.contains_key(symbol) && self.entries.len() >= self.capacity {
            self.evict_oldest();
        }
        self.entries.insert(
            symbol.to_string(),
            Entry {
                info,
                fetched_at: Instant::now(),
            },
        );
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.fetched_at)
            .map(|(symbol, _)| symbol.clone());

        if let Some(symbol) = oldest {
            log::debug!("Evicting cached metadata for {}", symbol);
            self.entries.remove(&symbol);
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn contains(&self, symbol: &str) -> bool {
        self.entries.contains_key(symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn info(name: &str) -> StockInfo {
        let mut info = StockInfo::default();
        info.insert("shortName", json!(name));
        info
    }

    #[test]
    fn returns_live_entries() {
        let mut cache = MetadataCache::new(Duration::from_secs(60), 4);
        cache.insert("AAPL", info("Apple"));
        assert_eq!(cache.get("AAPL").unwrap().str("shortName"), Some("Apple"));
        assert!(cache.get("MSFT").is_none());
    }

    #[test]
    fn expired_entries_are_dropped() {
        let mut cache = MetadataCache::new(Duration::ZERO, 4);
        cache.insert("AAPL", info("Apple"));
        assert!(cache.get("AAPL").is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn full_cache_evicts_oldest() {
        let mut cache = MetadataCache::new(Duration::from_secs(60), 2);
        cache.insert("AAPL", info("Apple"));
        std::thread::sleep(Duration::from_millis(2));
        cache.insert("MSFT", info("Microsoft"));
        std::thread::sleep(Duration::from_millis(2));
        cache.insert("GOOG", info("Alphabet"));

        assert_eq!(cache.len(), 2);
        assert!(!cache.contains("AAPL"));
        assert!(cache.contains("MSFT"));
        assert!(cache.contains("GOOG"));
    }

    #[test]
    fn refreshing_a_symbol_does_not_evict() {
        let mut cache = MetadataCache::new(Duration::from_secs(60), 2);
        cache.insert("AAPL", info("Apple"));
        cache.insert("MSFT", info("Microsoft"));
        cache.insert("AAPL", info("Apple Inc."));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("AAPL").unwrap().str("shortName"), Some("Apple Inc."));
    }
}
