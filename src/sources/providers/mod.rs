//! The `WeatherSource` capability (§9: "the only interface; use a sum type
//! of concrete providers sharing a base struct") and the five concrete
//! adapters in scope (§6).

pub mod open_meteo;
pub mod openweathermap;
pub mod tomorrow_io;
pub mod visual_crossing;
pub mod weatherapi;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::geo::GeoPoint;
use crate::errors::AppError;

/// Per-provider configuration (§6's `weather_apis.<name>.{base_url,
/// rate_limit, api_key}`).
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub rate_limit_per_minute: f64,
}

/// A decoded-but-not-yet-wrapped provider reading. `measured_at` is `None`
/// when the provider's payload omits a timestamp (§4.1 step 5 fills in
/// "now" in that case); `confidence` is `None` when the provider doesn't
/// supply one (defaulted to 1.0 by the caller).
#[derive(Debug, Clone)]
pub struct RawReading {
    pub temperature_c: f64,
    pub humidity_pct: Option<f64>,
    pub wind_mps: Option<f64>,
    pub precip_mm: Option<f64>,
    pub pressure_hpa: Option<f64>,
    pub measured_at: Option<DateTime<Utc>>,
    pub confidence: Option<f64>,
}

/// Converts a km/h wind reading to m/s.
pub(crate) fn kmh_to_mps(v: f64) -> f64 {
    v / 3.6
}

/// Converts a mph wind reading to m/s, using the factor this system's
/// provider layer has always used (`0.277778`) — the same numeric factor as
/// the km/h conversion, carried forward unchanged from the upstream spec.
pub(crate) fn mph_to_mps(v: f64) -> f64 {
    v * 0.277778
}

#[async_trait]
pub trait WeatherSource: Send + Sync {
    /// Stable identifier used for cache keys, reliability weighting, and
    /// the audit trail (§3, §4.3).
    fn name(&self) -> &str;

    /// Issue the provider-specific request and decode its response into the
    /// uniform shape. Unit conversion happens here (§4.1 step 4); rate
    /// limiting, timeouts, HTTP status handling, and caching are the
    /// registry's job, not the provider's.
    async fn fetch_raw(
        &self,
        client: &reqwest::Client,
        point: &GeoPoint,
    ) -> Result<RawReading, AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kmh_conversion() {
        assert!((kmh_to_mps(36.0) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn mph_conversion_factor() {
        assert!((mph_to_mps(36.0) - 10.0).abs() < 1e-9);
    }
}
