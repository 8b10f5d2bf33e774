//! Open-Meteo — the one keyless provider in scope (§6).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::domain::geo::GeoPoint;
use crate::errors::AppError;

use super::{kmh_to_mps, ProviderConfig, RawReading, WeatherSource};

pub struct OpenMeteoProvider {
    config: ProviderConfig,
}

impl OpenMeteoProvider {
    pub fn new(config: ProviderConfig) -> Self {
        Self { config }
    }
}

#[derive(Debug, Deserialize)]
struct OpenMeteoResponse {
    current: OpenMeteoCurrent,
}

#[derive(Debug, Deserialize)]
struct OpenMeteoCurrent {
    time: Option<String>,
    temperature_2m: f64,
    relative_humidity_2m: Option<f64>,
    wind_speed_10m: Option<f64>,
    precipitation: Option<f64>,
    surface_pressure: Option<f64>,
}

#[async_trait]
impl WeatherSource for OpenMeteoProvider {
    fn name(&self) -> &str {
        "Open-Meteo"
    }

    async fn fetch_raw(
        &self,
        client: &reqwest::Client,
        point: &GeoPoint,
    ) -> Result<RawReading, AppError> {
        let url = format!(
            "{}/v1/forecast?latitude={}&longitude={}&current=temperature_2m,relative_humidity_2m,wind_speed_10m,precipitation,surface_pressure",
            self.config.base_url, point.latitude, point.longitude
        );

        let response = client
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::UpstreamError(format!("Open-Meteo request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::UpstreamError(format!(
                "Open-Meteo returned HTTP {}",
                response.status()
            )));
        }

        let body: OpenMeteoResponse = response
            .json()
            .await
            .map_err(|e| AppError::UpstreamError(format!("Open-Meteo decode error: {}", e)))?;

        let measured_at = body
            .current
            .time
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Ok(RawReading {
            temperature_c: body.current.temperature_2m,
            humidity_pct: body.current.relative_humidity_2m,
            wind_mps: body.current.wind_speed_10m.map(kmh_to_mps),
            precip_mm: body.current.precipitation,
            pressure_hpa: body.current.surface_pressure,
            measured_at,
            confidence: None,
        })
    }
}
