//! WeatherAPI.com — keyed provider, wind reported in km/h.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::domain::geo::GeoPoint;
use crate::errors::AppError;

use super::{kmh_to_mps, ProviderConfig, RawReading, WeatherSource};

pub struct WeatherApiProvider {
    config: ProviderConfig,
}

impl WeatherApiProvider {
    pub fn new(config: ProviderConfig) -> Self {
        Self { config }
    }

    fn api_key(&self) -> Result<&str, AppError> {
        self.config.api_key.as_deref().ok_or_else(|| {
            AppError::InternalError("WeatherAPI provider configured without an API key".into())
        })
    }
}

#[derive(Debug, Deserialize)]
struct WeatherApiResponse {
    current: WeatherApiCurrent,
}

#[derive(Debug, Deserialize)]
struct WeatherApiCurrent {
    last_updated_epoch: Option<i64>,
    temp_c: f64,
    humidity: Option<f64>,
    wind_kph: Option<f64>,
    precip_mm: Option<f64>,
    pressure_mb: Option<f64>,
}

#[async_trait]
impl WeatherSource for WeatherApiProvider {
    fn name(&self) -> &str {
        "WeatherAPI"
    }

    async fn fetch_raw(
        &self,
        client: &reqwest::Client,
        point: &GeoPoint,
    ) -> Result<RawReading, AppError> {
        let url = format!(
            "{}/v1/current.json?key={}&q={},{}",
            self.config.base_url,
            self.api_key()?,
            point.latitude,
            point.longitude
        );

        let response = client
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::UpstreamError(format!("WeatherAPI request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::UpstreamError(format!(
                "WeatherAPI returned HTTP {}",
                response.status()
            )));
        }

        let body: WeatherApiResponse = response
            .json()
            .await
            .map_err(|e| AppError::UpstreamError(format!("WeatherAPI decode error: {}", e)))?;

        let measured_at = body
            .current
            .last_updated_epoch
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .map(|dt| dt.with_timezone(&Utc));

        Ok(RawReading {
            temperature_c: body.current.temp_c,
            humidity_pct: body.current.humidity,
            wind_mps: body.current.wind_kph.map(kmh_to_mps),
            precip_mm: body.current.precip_mm,
            pressure_hpa: body.current.pressure_mb,
            measured_at,
            confidence: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn fetch_converts_kph_to_mps() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/current.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "current": {
                    "last_updated_epoch": 1_700_000_000i64,
                    "temp_c": 30.0,
                    "humidity": 40.0,
                    "wind_kph": 36.0,
                    "precip_mm": 0.0,
                    "pressure_mb": 1008.0
                }
            })))
            .mount(&server)
            .await;

        let provider = WeatherApiProvider::new(ProviderConfig {
            base_url: server.uri(),
            api_key: Some("test-key".into()),
            rate_limit_per_minute: 60.0,
        });
        let client = reqwest::Client::new();
        let point = GeoPoint::new(25.2, 55.3, None, None).unwrap();
        let reading = provider.fetch_raw(&client, &point).await.unwrap();

        assert_eq!(reading.temperature_c, 30.0);
        assert!((reading.wind_mps.unwrap() - 10.0).abs() < 1e-9);
    }
}
