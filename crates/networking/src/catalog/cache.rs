//! In-memory symbol-spec cache with TTL

use mexcbot_core::SymbolSpec;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

struct CacheEntry {
    value: SymbolSpec,
    inserted_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.inserted_at.elapsed() > self.ttl
    }
}

/// Thread-safe spec cache with TTL and max-entry bounds
pub struct SpecCache {
    specs: RwLock<HashMap<String, CacheEntry>>,
    default_ttl: Duration,
    max_entries: usize,
}

impl SpecCache {
    pub fn with_capacity(default_ttl: Duration, max_entries: usize) -> Self {
        Self {
            specs: RwLock::new(HashMap::new()),
            default_ttl,
            max_entries,
        }
    }

    /// Get a spec from cache if not expired
    pub fn get(&self, symbol: &str) -> Option<SymbolSpec> {
        let cache = self.specs.read().ok()?;
        let entry = cache.get(symbol)?;

        if entry.is_expired() {
            None
        } else {
            Some(entry.value.clone())
        }
    }

    /// Insert or update a spec.
    /// Evicts expired entries, then the oldest entry, when at capacity.
    pub fn insert(&self, spec: SymbolSpec) {
        if let Ok(mut cache) = self.specs.write() {
            if cache.len() >= self.max_entries {
                cache.retain(|_, entry| !entry.is_expired());
            }

            if cache.len() >= self.max_entries {
                if let Some(oldest_key) = cache
                    .iter()
                    .min_by_key(|(_, e)| e.inserted_at)
                    .map(|(k, _)| k.clone())
                {
                    cache.remove(&oldest_key);
                }
            }

            let symbol = spec.symbol.clone();
            cache.insert(
                symbol,
                CacheEntry {
                    value: spec,
                    inserted_at: Instant::now(),
                    ttl: self.default_ttl,
                },
            );
        }
    }

    /// Remove a spec (e.g. to force a refresh on next resolve)
    pub fn invalidate(&self, symbol: &str) {
        if let Ok(mut cache) = self.specs.write() {
            cache.remove(symbol);
        }
    }

    pub fn len(&self) -> usize {
        self.specs.read().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn spec(symbol: &str) -> SymbolSpec {
        SymbolSpec {
            symbol: symbol.to_string(),
            status: "ENABLED".to_string(),
            spot_allowed: true,
            base_asset: "XRP".to_string(),
            quote_asset: "USDT".to_string(),
            step_size: Decimal::new(1, 1),
            tick_size: Decimal::new(1, 4),
            min_qty: Decimal::new(1, 1),
            max_qty: Decimal::from(90_000),
        }
    }

    #[test]
    fn hit_until_expiry() {
        let cache = SpecCache::with_capacity(Duration::from_secs(300), 16);
        cache.insert(spec("XRPUSDT"));
        assert!(cache.get("XRPUSDT").is_some());
        assert!(cache.get("BTCUSDT").is_none());
    }

    #[test]
    fn expired_entries_miss() {
        let cache = SpecCache::with_capacity(Duration::ZERO, 16);
        cache.insert(spec("XRPUSDT"));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("XRPUSDT").is_none());
    }

    #[test]
    fn capacity_evicts_oldest() {
        let cache = SpecCache::with_capacity(Duration::from_secs(300), 2);
        cache.insert(spec("AUSDT"));
        std::thread::sleep(Duration::from_millis(2));
        cache.insert(spec("BUSDT"));
        std::thread::sleep(Duration::from_millis(2));
        cache.insert(spec("CUSDT"));
        assert_eq!(cache.len(), 2);
        assert!(cache.get("AUSDT").is_none());
        assert!(cache.get("CUSDT").is_some());
    }

    #[test]
    fn invalidate_removes_entry() {
        let cache = SpecCache::with_capacity(Duration::from_secs(300), 16);
        cache.insert(spec("XRPUSDT"));
        cache.invalidate("XRPUSDT");
        assert!(cache.is_empty());
    }
}
