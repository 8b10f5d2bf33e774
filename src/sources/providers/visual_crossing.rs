//! Visual Crossing — keyed provider, wind in km/h under `unitGroup=metric`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::domain::geo::GeoPoint;
use crate::errors::AppError;

use super::{kmh_to_mps, ProviderConfig, RawReading, WeatherSource};

pub struct VisualCrossingProvider {
    config: ProviderConfig,
}

impl VisualCrossingProvider {
    pub fn new(config: ProviderConfig) -> Self {
        Self { config }
    }

    fn api_key(&self) -> Result<&str, AppError> {
        self.config.api_key.as_deref().ok_or_else(|| {
            AppError::InternalError("Visual Crossing provider configured without an API key".into())
        })
    }
}

#[derive(Debug, Deserialize)]
struct VisualCrossingResponse {
    #[serde(rename = "currentConditions")]
    current_conditions: VisualCrossingCurrent,
}

#[derive(Debug, Deserialize)]
struct VisualCrossingCurrent {
    #[serde(rename = "datetimeEpoch")]
    datetime_epoch: Option<i64>,
    temp: f64,
    humidity: Option<f64>,
    windspeed: Option<f64>,
    precip: Option<f64>,
    pressure: Option<f64>,
}

#[async_trait]
impl WeatherSource for VisualCrossingProvider {
    fn name(&self) -> &str {
        "VisualCrossing"
    }

    async fn fetch_raw(
        &self,
        client: &reqwest::Client,
        point: &GeoPoint,
    ) -> Result<RawReading, AppError> {
        let url = format!(
            "{}/VisualCrossingWebServices/rest/services/timeline/{},{}?key={}&unitGroup=metric",
            self.config.base_url,
            point.latitude,
            point.longitude,
            self.api_key()?
        );

        let response = client.get(&url).send().await.map_err(|e| {
            AppError::UpstreamError(format!("Visual Crossing request failed: {}", e))
        })?;

        if !response.status().is_success() {
            return Err(AppError::UpstreamError(format!(
                "Visual Crossing returned HTTP {}",
                response.status()
            )));
        }

        let body: VisualCrossingResponse = response.json().await.map_err(|e| {
            AppError::UpstreamError(format!("Visual Crossing decode error: {}", e))
        })?;

        let measured_at = body
            .current_conditions
            .datetime_epoch
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .map(|dt| dt.with_timezone(&Utc));

        Ok(RawReading {
            temperature_c: body.current_conditions.temp,
            humidity_pct: body.current_conditions.humidity,
            wind_mps: body.current_conditions.windspeed.map(kmh_to_mps),
            precip_mm: body.current_conditions.precip,
            pressure_hpa: body.current_conditions.pressure,
            measured_at,
            confidence: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn fetch_converts_kph_to_mps() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(
                r"^/VisualCrossingWebServices/rest/services/timeline/.*$",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "currentConditions": {
                    "datetimeEpoch": 1_700_000_000i64,
                    "temp": 12.0,
                    "humidity": 70.0,
                    "windspeed": 18.0,
                    "precip": 1.2,
                    "pressure": 1011.0
                }
            })))
            .mount(&server)
            .await;

        let provider = VisualCrossingProvider::new(ProviderConfig {
            base_url: server.uri(),
            api_key: Some("test-key".into()),
            rate_limit_per_minute: 60.0,
        });
        let client = reqwest::Client::new();
        let point = GeoPoint::new(48.85, 2.35, None, None).unwrap();
        let reading = provider.fetch_raw(&client, &point).await.unwrap();

        assert_eq!(reading.temperature_c, 12.0);
        assert!((reading.wind_mps.unwrap() - 5.0).abs() < 1e-9);
    }
}
