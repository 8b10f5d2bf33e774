//! OpenWeatherMap — keyed provider, wind already in m/s under `units=metric`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::domain::geo::GeoPoint;
use crate::errors::AppError;

use super::{ProviderConfig, RawReading, WeatherSource};

pub struct OpenWeatherMapProvider {
    config: ProviderConfig,
}

impl OpenWeatherMapProvider {
    pub fn new(config: ProviderConfig) -> Self {
        Self { config }
    }

    fn api_key(&self) -> Result<&str, AppError> {
        self.config.api_key.as_deref().ok_or_else(|| {
            AppError::InternalError("OpenWeatherMap provider configured without an API key".into())
        })
    }
}

#[derive(Debug, Deserialize)]
struct OwmResponse {
    main: OwmMain,
    wind: Option<OwmWind>,
    rain: Option<OwmPrecip>,
    dt: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct OwmMain {
    temp: f64,
    humidity: Option<f64>,
    pressure: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwmWind {
    speed: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwmPrecip {
    #[serde(rename = "1h")]
    one_hour: Option<f64>,
}

#[async_trait]
impl WeatherSource for OpenWeatherMapProvider {
    fn name(&self) -> &str {
        "OpenWeatherMap"
    }

    async fn fetch_raw(
        &self,
        client: &reqwest::Client,
        point: &GeoPoint,
    ) -> Result<RawReading, AppError> {
        let url = format!(
            "{}/data/2.5/weather?lat={}&lon={}&appid={}&units=metric",
            self.config.base_url,
            point.latitude,
            point.longitude,
            self.api_key()?
        );

        let response = client.get(&url).send().await.map_err(|e| {
            AppError::UpstreamError(format!("OpenWeatherMap request failed: {}", e))
        })?;

        if !response.status().is_success() {
            return Err(AppError::UpstreamError(format!(
                "OpenWeatherMap returned HTTP {}",
                response.status()
            )));
        }

        let body: OwmResponse = response.json().await.map_err(|e| {
            AppError::UpstreamError(format!("OpenWeatherMap decode error: {}", e))
        })?;

        let measured_at = body
            .dt
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .map(|dt| dt.with_timezone(&Utc));

        Ok(RawReading {
            temperature_c: body.main.temp,
            humidity_pct: body.main.humidity,
            wind_mps: body.wind.and_then(|w| w.speed),
            precip_mm: body.rain.and_then(|r| r.one_hour),
            pressure_hpa: body.main.pressure,
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

    fn provider(base_url: String) -> OpenWeatherMapProvider {
        OpenWeatherMapProvider::new(ProviderConfig {
            base_url,
            api_key: Some("test-key".into()),
            rate_limit_per_minute: 60.0,
        })
    }

    #[tokio::test]
    async fn fetch_parses_wind_without_conversion() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "main": {"temp": 18.5, "humidity": 60.0, "pressure": 1015.0},
                "wind": {"speed": 4.2},
                "rain": {"1h": 0.5},
                "dt": 1_700_000_000i64
            })))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let point = GeoPoint::new(51.5, -0.1, None, None).unwrap();
        let reading = provider(server.uri())
            .fetch_raw(&client, &point)
            .await
            .unwrap();

        assert_eq!(reading.temperature_c, 18.5);
        assert_eq!(reading.wind_mps, Some(4.2));
        assert_eq!(reading.precip_mm, Some(0.5));
        assert!(reading.measured_at.is_some());
    }

    #[tokio::test]
    async fn missing_api_key_is_internal_error() {
        let provider = OpenWeatherMapProvider::new(ProviderConfig {
            base_url: "http://unused.invalid".into(),
            api_key: None,
            rate_limit_per_minute: 60.0,
        });
        let client = reqwest::Client::new();
        let point = GeoPoint::new(0.0, 0.0, None, None).unwrap();
        let result = provider.fetch_raw(&client, &point).await;
        assert!(matches!(result, Err(AppError::InternalError(_))));
    }
}
