//! Synthetic observation series for `demo_mode` claim requests (§9,
//! supplemented per SPEC_FULL.md): lets a caller exercise the full claims
//! pipeline without wiring up real historical weather data.

use chrono::NaiveDate;

use crate::domain::policy::{DailyObservationInput, HourlyReading};

const DEMO_SOURCE: &str = "Open-Meteo";

fn synthetic_day(date: &str, temp: f64, wind: f64, precip: f64, humidity: f64) -> DailyObservationInput {
    DailyObservationInput {
        date: date.parse::<NaiveDate>().expect("valid ISO date literal"),
        hourly: vec![HourlyReading {
            hour: 14,
            source: DEMO_SOURCE.into(),
            temp_c: temp,
            wind_mps: Some(wind),
            precip_mm: Some(precip),
            humidity_pct: Some(humidity),
            confidence: 0.95,
        }],
    }
}

/// Returns the named synthetic series, or `None` for an unrecognized name
/// (the caller turns that into a `BadRequest`).
pub fn series_for(name: &str) -> Option<Vec<DailyObservationInput>> {
    match name {
        "heat_wave" => Some(vec![
            synthetic_day("2026-07-10", 36.5, 2.0, 0.0, 25.0),
            synthetic_day("2026-07-11", 37.8, 1.5, 0.0, 20.0),
            synthetic_day("2026-07-12", 38.4, 1.0, 0.0, 18.0),
            synthetic_day("2026-07-13", 39.1, 1.5, 0.0, 15.0),
        ]),
        "cold_snap" => Some(vec![
            synthetic_day("2026-01-10", -12.0, 5.0, 0.0, 60.0),
            synthetic_day("2026-01-11", -14.5, 6.0, 0.0, 62.0),
            synthetic_day("2026-01-12", -15.2, 6.5, 0.0, 65.0),
        ]),
        "drought" => Some(vec![
            synthetic_day("2026-05-01", 28.0, 3.0, 0.0, 22.0),
            synthetic_day("2026-05-02", 29.0, 3.0, 0.0, 20.0),
            synthetic_day("2026-05-03", 30.0, 3.5, 0.0, 18.0),
            synthetic_day("2026-05-04", 29.5, 3.0, 0.0, 19.0),
            synthetic_day("2026-05-05", 30.5, 2.5, 0.0, 17.0),
        ]),
        "normal" => Some(vec![
            synthetic_day("2026-04-01", 18.0, 4.0, 2.0, 55.0),
            synthetic_day("2026-04-02", 19.5, 3.5, 0.0, 50.0),
            synthetic_day("2026-04-03", 17.0, 4.5, 1.0, 58.0),
        ]),
        _ => None,
    }
}
