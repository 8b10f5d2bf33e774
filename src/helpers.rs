//! Shared numeric helpers and a hex-string serde adapter for signature bytes.
//!
//! Mirrors the teacher's `helpers.rs` role (small, well-tested, widely
//! imported conversions) but for the statistics this service actually needs:
//! median/MAD for the consensus engine (§4.3) instead of Decimal precision
//! conversions.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Median of a slice of finite f64s. Panics on an empty slice — callers must
/// guard with a quorum check first (the consensus engine never calls this on
/// fewer than `min_sources` values).
pub(crate) fn median(values: &[f64]) -> f64 {
    let mut sorted: Vec<f64> = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).expect("non-finite value in median input"));
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

/// Median absolute deviation around a given center, with the §4.3 floor
/// substitution (`mad := 0.01`) applied when the raw MAD is exactly zero.
pub(crate) fn mad_with_floor(values: &[f64], center: f64) -> f64 {
    let deviations: Vec<f64> = values.iter().map(|x| (x - center).abs()).collect();
    let raw = median(&deviations);
    if raw == 0.0 {
        0.01
    } else {
        raw
    }
}

pub(crate) fn clamp(v: f64, lo: f64, hi: f64) -> f64 {
    v.max(lo).min(hi)
}

/// Serde adapter so `Vec<u8>` signature fields serialize as lowercase hex
/// strings in JSON instead of byte arrays.
pub mod hex_bytes {
    use super::*;

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}
