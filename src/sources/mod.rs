//! Source registry (C1, §4.1): wires the five providers to their own
//! rate limiter and a shared cache, and exposes the single `fetch` contract
//! the executor drives.

pub mod cache;
pub mod providers;
pub mod rate_limiter;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;

use crate::domain::geo::GeoPoint;
use crate::domain::observation::Observation;
use crate::errors::AppError;
use crate::signing;

use cache::WeatherCache;
use providers::WeatherSource;
use rate_limiter::RateLimiter;

struct SourceEntry {
    provider: Box<dyn WeatherSource>,
    limiter: RateLimiter,
}

/// Holds every configured provider plus the shared cache. Constructed once
/// at startup from `AppConfig` and shared behind an `Arc` (§5).
pub struct SourceRegistry {
    sources: HashMap<String, SourceEntry>,
    cache: Arc<WeatherCache>,
    client: reqwest::Client,
    cache_ttl: Duration,
}

impl SourceRegistry {
    pub fn new(client: reqwest::Client, cache: Arc<WeatherCache>, cache_ttl: Duration) -> Self {
        Self {
            sources: HashMap::new(),
            cache,
            client,
            cache_ttl,
        }
    }

    pub fn register(&mut self, provider: Box<dyn WeatherSource>, rate_limit_per_minute: f64) {
        let name = provider.name().to_string();
        self.sources.insert(
            name,
            SourceEntry {
                provider,
                limiter: RateLimiter::new(rate_limit_per_minute),
            },
        );
    }

    pub fn source_names(&self) -> Vec<String> {
        self.sources.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// The full §4.1 fetch contract: wait for a rate-limit token, check the
    /// cache, otherwise issue the provider request, normalize the result
    /// into a signed `Observation`, and cache it. `deadline` bounds both the
    /// rate-limit wait and the upstream HTTP call.
    pub async fn fetch(
        &self,
        source: &str,
        point: &GeoPoint,
        operator_id: &str,
        task_id: &str,
        deadline: Instant,
    ) -> Result<Observation, AppError> {
        let entry = self
            .sources
            .get(source)
            .ok_or_else(|| AppError::InternalError(format!("unknown weather source: {}", source)))?;

        let cache_key = WeatherCache::key(source, point);
        if let Some(cached) = self.cache.get(&cache_key).await {
            return Ok(cached);
        }

        entry.limiter.acquire(deadline).await?;

        let timeout = deadline
            .checked_duration_since(Instant::now())
            .unwrap_or(Duration::ZERO)
            .min(Duration::from_secs(30));

        let raw = tokio::time::timeout(timeout, entry.provider.fetch_raw(&self.client, point))
            .await
            .map_err(|_| AppError::UpstreamError(format!("{} fetch timed out", source)))??;

        let measured_at = raw.measured_at.unwrap_or_else(Utc::now);
        let temperature_c = raw.temperature_c;
        let signature = signing::sign(operator_id, task_id, temperature_c);

        let observation = Observation {
            source: source.to_string(),
            measured_at,
            temperature_c,
            humidity_pct: raw.humidity_pct,
            wind_mps: raw.wind_mps,
            precip_mm: raw.precip_mm,
            pressure_hpa: raw.pressure_hpa,
            confidence: raw.confidence.unwrap_or(1.0),
            signature,
        };

        self.cache
            .insert(cache_key, observation.clone(), self.cache_ttl)
            .await;

        Ok(observation)
    }
}
