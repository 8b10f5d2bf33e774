//! A single weather reading from a single source (§3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::helpers::hex_bytes;

/// One reading from one weather source. Immutable once constructed; owned
/// transitively by the task that requested it until that task reaches a
/// terminal state.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Observation {
    pub source: String,
    pub measured_at: DateTime<Utc>,
    pub temperature_c: f64,
    pub humidity_pct: Option<f64>,
    pub wind_mps: Option<f64>,
    pub precip_mm: Option<f64>,
    pub pressure_hpa: Option<f64>,
    /// In `[0, 1]`. Producer-supplied or defaulted to 1.0, then attenuated
    /// by fetch-latency and sample-age penalties (§4.2).
    pub confidence: f64,
    /// Signed by the operator that fetched this sample, over
    /// `(operator_id, task_id, temperature_c)` (§3).
    #[serde(with = "hex_bytes")]
    #[schema(value_type = String)]
    pub signature: Vec<u8>,
}

/// Per-source reliability score used as a consensus weighting factor (§4.3).
/// Process-wide, static configuration — not hot-reloadable (§9).
pub fn source_reliability(source: &str) -> f64 {
    match source {
        "OpenWeatherMap" => 0.95,
        "WeatherAPI" => 0.93,
        "Tomorrow.io" => 0.92,
        "VisualCrossing" => 0.90,
        "Open-Meteo" => 0.88,
        _ => 0.80,
    }
}
