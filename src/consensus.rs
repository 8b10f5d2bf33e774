//! Robust-statistics consensus engine (C3, §4.3).
//!
//! Generic over which scalar field of an `Observation` is being aggregated
//! — temperature by default, but the same pipeline serves wind/precip/
//! humidity consensus too (§9: "one generic engine, not one per field").

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::domain::observation::{source_reliability, Observation};
use crate::errors::AppError;
use crate::helpers::{clamp, mad_with_floor, median};

/// The result of running consensus over one field across one task's kept
/// observations.
#[derive(Debug, Clone)]
pub struct ConsensusOutput {
    pub value: f64,
    pub confidence: f64,
    pub stability: f64,
    pub agreement: f64,
    pub kept: Vec<Observation>,
    pub aggregated_sig: Vec<u8>,
}

/// Extracts the field this consensus run is aggregating over. Observations
/// for which the field is absent (`None`) are excluded before outlier
/// filtering even begins.
pub type FieldExtractor = fn(&Observation) -> Option<f64>;

pub fn temperature_field(o: &Observation) -> Option<f64> {
    Some(o.temperature_c)
}

pub fn wind_field(o: &Observation) -> Option<f64> {
    o.wind_mps
}

pub fn precip_field(o: &Observation) -> Option<f64> {
    o.precip_mm
}

pub fn humidity_field(o: &Observation) -> Option<f64> {
    o.humidity_pct
}

/// Runs the full consensus pipeline: MAD outlier rejection, reliability-
/// weighted mean, and a stability/agreement confidence score.
///
/// Fails with `InsufficientQuorum` when fewer than `min_sources` readings
/// survive outlier filtering, even if more than `min_sources` were submitted
/// (§4.3, §7).
pub fn compute(
    observations: &[Observation],
    field: FieldExtractor,
    min_sources: usize,
    mad_threshold: f64,
) -> Result<ConsensusOutput, AppError> {
    let submitted = observations.len();
    let candidates: Vec<(&Observation, f64)> = observations
        .iter()
        .filter_map(|o| field(o).map(|v| (o, v)))
        .collect();

    if candidates.len() < min_sources {
        return Err(AppError::InsufficientQuorum(format!(
            "only {} of {} submitted observations carry the requested field",
            candidates.len(),
            submitted
        )));
    }

    let values: Vec<f64> = candidates.iter().map(|(_, v)| *v).collect();
    let center = median(&values);
    let mad = mad_with_floor(&values, center);

    let kept: Vec<(&Observation, f64)> = candidates
        .into_iter()
        .filter(|(_, v)| (v - center).abs() <= mad_threshold * mad)
        .collect();

    if kept.len() < min_sources {
        return Err(AppError::InsufficientQuorum(format!(
            "only {} of {} observations survived outlier filtering (need {})",
            kept.len(),
            submitted,
            min_sources
        )));
    }

    let weights: Vec<f64> = kept.iter().map(|(o, _)| reliability_weight(o)).collect();
    let total_weight: f64 = weights.iter().sum();

    // Fallback for the degenerate all-zero-weight case (§4.3 step 5): report
    // the unweighted median at a fixed, conservative confidence instead of
    // dividing by zero.
    if total_weight == 0.0 {
        let aggregated_sig = aggregate_signature(&kept);
        return Ok(ConsensusOutput {
            value: center,
            confidence: 0.5,
            stability: 0.5,
            agreement: 0.5,
            kept: kept.into_iter().map(|(o, _)| o.clone()).collect(),
            aggregated_sig,
        });
    }

    let weighted_mean = kept
        .iter()
        .zip(&weights)
        .map(|((_, v), w)| v * w)
        .sum::<f64>()
        / total_weight;

    let weighted_variance = kept
        .iter()
        .zip(&weights)
        .map(|((_, v), w)| w * (v - weighted_mean).powi(2))
        .sum::<f64>()
        / total_weight;

    // §4.3 step 6: stability from weighted variance, agreement from the
    // unweighted mean absolute deviation around the consensus value.
    let stability = 1.0 - clamp(weighted_variance.sqrt() / 10.0, 0.0, 1.0);
    let mean_abs_deviation = kept
        .iter()
        .map(|(_, v)| (v - weighted_mean).abs())
        .sum::<f64>()
        / kept.len() as f64;
    let agreement = (1.0 - mean_abs_deviation / 5.0).max(0.0);
    let confidence = (stability + agreement) / 2.0;

    let aggregated_sig = aggregate_signature(&kept);

    Ok(ConsensusOutput {
        value: weighted_mean,
        confidence,
        stability,
        agreement,
        kept: kept.into_iter().map(|(o, _)| o.clone()).collect(),
        aggregated_sig,
    })
}

/// Reliability weight for one survivor (§4.3 step 4): starts at 1.0, applies
/// the age penalty, then the sample's own confidence, then the source's
/// static reliability score, clamped to a floor of 0.1.
fn reliability_weight(observation: &Observation) -> f64 {
    let mut w = 1.0;
    let age_minutes = (Utc::now() - observation.measured_at).num_seconds() as f64 / 60.0;
    if age_minutes > 5.0 {
        w *= (1.0 - age_minutes / 60.0).max(0.5);
    }
    w *= observation.confidence;
    w *= source_reliability(&observation.source);
    w.max(0.1)
}

/// SHA-256 over `source || "%.2f" % value || operator_signature` for each
/// kept observation, concatenated in input order (§4.3).
fn aggregate_signature(kept: &[(&Observation, f64)]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    for (observation, value) in kept {
        hasher.update(observation.source.as_bytes());
        hasher.update(format!("{:.2}", value).as_bytes());
        hasher.update(&observation.signature);
    }
    hasher.finalize().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn obs(source: &str, temp: f64, confidence: f64) -> Observation {
        Observation {
            source: source.to_string(),
            measured_at: Utc::now(),
            temperature_c: temp,
            humidity_pct: None,
            wind_mps: None,
            precip_mm: None,
            pressure_hpa: None,
            confidence,
            signature: vec![1, 2, 3],
        }
    }

    #[test]
    fn outlier_is_rejected_and_remaining_sources_reach_consensus() {
        // matches the 22.0 / 22.5 / 23.0 / 37.0 scenario: median 22.75,
        // mad 0.5, threshold 2.5 => keep window is [21.5, 24.0], 37.0 is out.
        let observations = vec![
            obs("OpenWeatherMap", 22.0, 1.0),
            obs("WeatherAPI", 22.5, 1.0),
            obs("Tomorrow.io", 23.0, 1.0),
            obs("VisualCrossing", 37.0, 1.0),
        ];
        let result = compute(&observations, temperature_field, 3, 2.5).unwrap();
        assert_eq!(result.kept.len(), 3);
        assert!(result.kept.iter().all(|o| o.temperature_c != 37.0));
    }

    #[test]
    fn insufficient_quorum_after_filtering() {
        let observations = vec![
            obs("OpenWeatherMap", 20.0, 1.0),
            obs("WeatherAPI", 20.0, 1.0),
            obs("Tomorrow.io", 100.0, 1.0),
        ];
        let result = compute(&observations, temperature_field, 3, 2.5);
        assert!(matches!(result, Err(AppError::InsufficientQuorum(_))));
    }

    #[test]
    fn missing_field_observations_are_excluded_before_quorum_check() {
        let mut high_wind = obs("OpenWeatherMap", 20.0, 1.0);
        high_wind.wind_mps = Some(5.0);
        let mut low_wind = obs("WeatherAPI", 20.0, 1.0);
        low_wind.wind_mps = Some(5.5);
        let no_wind = obs("Tomorrow.io", 20.0, 1.0); // wind_mps: None

        let observations = vec![high_wind, low_wind, no_wind];
        let result = compute(&observations, wind_field, 2, 2.5).unwrap();
        assert_eq!(result.kept.len(), 2);
    }

    #[test]
    fn lower_reliability_source_pulls_the_mean_less() {
        let observations = vec![
            obs("OpenWeatherMap", 20.0, 1.0),  // reliability 0.95
            obs("UnknownProvider", 30.0, 1.0), // reliability 0.80
            obs("WeatherAPI", 20.0, 1.0),
        ];
        let result = compute(&observations, temperature_field, 3, 5.0).unwrap();
        assert!(result.value < 23.5, "high-reliability sources should dominate");
    }

    #[test]
    fn tight_agreement_yields_high_confidence() {
        // S1: three close readings, no outliers, no consensus threshold met.
        let observations = vec![
            obs("OpenWeatherMap", 22.4, 1.0),
            obs("WeatherAPI", 22.6, 1.0),
            obs("Tomorrow.io", 22.5, 1.0),
        ];
        let result = compute(&observations, temperature_field, 3, 2.5).unwrap();
        assert_eq!(result.kept.len(), 3);
        assert!((result.value - 22.5).abs() < 0.2);
        assert!(result.confidence >= 0.9, "confidence was {}", result.confidence);
    }

    #[test]
    fn aggregated_signature_is_deterministic_for_same_input() {
        let observations = vec![
            obs("OpenWeatherMap", 20.0, 1.0),
            obs("WeatherAPI", 20.5, 1.0),
            obs("Tomorrow.io", 20.2, 1.0),
        ];
        let a = compute(&observations, temperature_field, 3, 2.5).unwrap();
        let b = compute(&observations, temperature_field, 3, 2.5).unwrap();
        assert_eq!(a.aggregated_sig, b.aggregated_sig);
    }
}
