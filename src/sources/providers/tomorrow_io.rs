//! Tomorrow.io — keyed provider, wind already in m/s.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::domain::geo::GeoPoint;
use crate::errors::AppError;

use super::{ProviderConfig, RawReading, WeatherSource};

pub struct TomorrowIoProvider {
    config: ProviderConfig,
}

impl TomorrowIoProvider {
    pub fn new(config: ProviderConfig) -> Self {
        Self { config }
    }

    fn api_key(&self) -> Result<&str, AppError> {
        self.config.api_key.as_deref().ok_or_else(|| {
            AppError::InternalError("Tomorrow.io provider configured without an API key".into())
        })
    }
}

#[derive(Debug, Deserialize)]
struct TomorrowResponse {
    data: TomorrowData,
}

#[derive(Debug, Deserialize)]
struct TomorrowData {
    time: Option<String>,
    values: TomorrowValues,
}

#[derive(Debug, Deserialize)]
struct TomorrowValues {
    temperature: f64,
    humidity: Option<f64>,
    #[serde(rename = "windSpeed")]
    wind_speed: Option<f64>,
    #[serde(rename = "precipitationIntensity")]
    precipitation_intensity: Option<f64>,
    #[serde(rename = "pressureSeaLevel")]
    pressure_sea_level: Option<f64>,
}

#[async_trait]
impl WeatherSource for TomorrowIoProvider {
    fn name(&self) -> &str {
        "Tomorrow.io"
    }

    async fn fetch_raw(
        &self,
        client: &reqwest::Client,
        point: &GeoPoint,
    ) -> Result<RawReading, AppError> {
        let url = format!(
            "{}/v4/weather/realtime?location={},{}&apikey={}",
            self.config.base_url,
            point.latitude,
            point.longitude,
            self.api_key()?
        );

        let response = client
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::UpstreamError(format!("Tomorrow.io request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::UpstreamError(format!(
                "Tomorrow.io returned HTTP {}",
                response.status()
            )));
        }

        let body: TomorrowResponse = response
            .json()
            .await
            .map_err(|e| AppError::UpstreamError(format!("Tomorrow.io decode error: {}", e)))?;

        let measured_at = body
            .data
            .time
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Ok(RawReading {
            temperature_c: body.data.values.temperature,
            humidity_pct: body.data.values.humidity,
            wind_mps: body.data.values.wind_speed,
            precip_mm: body.data.values.precipitation_intensity,
            pressure_hpa: body.data.values.pressure_sea_level,
            measured_at,
            confidence: None,
        })
    }
}
