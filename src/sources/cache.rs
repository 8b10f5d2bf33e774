//! Shared, source-prefixed TTL cache for fetched observations (§4.1, §5).
//!
//! Keys are `"{source}:{lat_rounded_6}:{lon_rounded_6}"` so entries from
//! different providers can never alias each other even though they share one
//! map. Reads are lazy-evicting (a stale hit is treated as a miss); a
//! background sweeper additionally purges expired entries every
//! `sweep_interval`. Total size is bounded by `max_entries` via LRU
//! eviction, per §5's memory-bounds note.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::geo::GeoPoint;
use crate::domain::observation::Observation;

struct Slot {
    observation: Observation,
    expires_at: DateTime<Utc>,
    last_used: Instant,
}

pub struct WeatherCache {
    entries: RwLock<HashMap<String, Slot>>,
    max_entries: usize,
}

impl WeatherCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries,
        }
    }

    pub fn key(source: &str, point: &GeoPoint) -> String {
        format!("{}:{}", source, point.rounded_key())
    }

    /// Returns `None` on a miss or a lazily-detected-expired entry (the
    /// entry is removed in the latter case).
    pub async fn get(&self, key: &str) -> Option<Observation> {
        let mut map = self.entries.write().await;
        let expired = match map.get(key) {
            Some(slot) => slot.expires_at <= Utc::now(),
            None => return None,
        };
        if expired {
            map.remove(key);
            return None;
        }
        let slot = map.get_mut(key).expect("checked above");
        slot.last_used = Instant::now();
        Some(slot.observation.clone())
    }

    pub async fn insert(&self, key: String, observation: Observation, ttl: Duration) {
        let mut map = self.entries.write().await;
        if map.len() >= self.max_entries && !map.contains_key(&key) {
            if let Some(lru_key) = map
                .iter()
                .min_by_key(|(_, slot)| slot.last_used)
                .map(|(k, _)| k.clone())
            {
                map.remove(&lru_key);
            }
        }
        let expires_at = Utc::now()
            + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(300));
        map.insert(
            key,
            Slot {
                observation,
                expires_at,
                last_used: Instant::now(),
            },
        );
    }

    /// Removes all entries whose TTL has elapsed. Returns the number removed.
    pub async fn sweep_expired(&self) -> usize {
        let mut map = self.entries.write().await;
        let now = Utc::now();
        let before = map.len();
        map.retain(|_, slot| slot.expires_at > now);
        before - map.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

/// Runs forever, sweeping expired cache entries on a fixed interval (§4.1).
/// Spawn with `tokio::spawn(run_cache_sweeper(...))`.
pub async fn run_cache_sweeper(cache: std::sync::Arc<WeatherCache>, interval: Duration) {
    loop {
        tokio::time::sleep(interval).await;
        let removed = cache.sweep_expired().await;
        if removed > 0 {
            tracing::debug!("cache sweep removed {} expired entries", removed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_observation() -> Observation {
        Observation {
            source: "Open-Meteo".into(),
            measured_at: Utc::now(),
            temperature_c: 20.0,
            humidity_pct: None,
            wind_mps: None,
            precip_mm: None,
            pressure_hpa: None,
            confidence: 1.0,
            signature: vec![],
        }
    }

    #[tokio::test]
    async fn insert_then_get_hits() {
        let cache = WeatherCache::new(10);
        cache
            .insert("k1".into(), sample_observation(), Duration::from_secs(60))
            .await;
        assert!(cache.get("k1").await.is_some());
    }

    #[tokio::test]
    async fn expired_entry_is_a_lazy_miss() {
        let cache = WeatherCache::new(10);
        cache
            .insert(
                "k1".into(),
                sample_observation(),
                Duration::from_millis(1),
            )
            .await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cache.get("k1").await.is_none());
        assert_eq!(cache.len().await, 0, "lazy read should have evicted it");
    }

    #[tokio::test]
    async fn sweeper_removes_expired_without_a_read() {
        let cache = WeatherCache::new(10);
        cache
            .insert(
                "k1".into(),
                sample_observation(),
                Duration::from_millis(1),
            )
            .await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        let removed = cache.sweep_expired().await;
        assert_eq!(removed, 1);
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn lru_eviction_bounds_total_entries() {
        let cache = WeatherCache::new(2);
        cache
            .insert("k1".into(), sample_observation(), Duration::from_secs(60))
            .await;
        cache
            .insert("k2".into(), sample_observation(), Duration::from_secs(60))
            .await;
        // touch k2 so k1 becomes least-recently-used
        cache.get("k2").await;
        cache
            .insert("k3".into(), sample_observation(), Duration::from_secs(60))
            .await;
        assert_eq!(cache.len().await, 2);
        assert!(cache.get("k1").await.is_none(), "k1 should have been evicted");
        assert!(cache.get("k2").await.is_some());
        assert!(cache.get("k3").await.is_some());
    }

    #[tokio::test]
    async fn keys_are_source_prefixed_to_avoid_aliasing() {
        let point = GeoPoint::new(47.123456, 8.654321, None, None).unwrap();
        let k1 = WeatherCache::key("Open-Meteo", &point);
        let k2 = WeatherCache::key("OpenWeatherMap", &point);
        assert_ne!(k1, k2);
    }
}
