//! Parametric insurance policy types (§3) and the day-indexed observation
//! series shape the claims evaluator (§4.5, C5) consumes.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::geo::GeoPoint;
use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PolicyType {
    Crop,
    Event,
    Travel,
    Property,
    Energy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Peril {
    HeatWave,
    ColdSnap,
    ExcessRain,
    HighWind,
    Frost,
    Hail,
    Drought,
    LowWind,
}

/// Month/hour window a trigger is restricted to (§3).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TimeWindow {
    /// 1..=12
    pub start_month: u8,
    /// 1..=12
    pub end_month: u8,
    /// 0..=23
    pub start_hour: Option<u8>,
    /// 0..=23
    pub end_hour: Option<u8>,
}

impl TimeWindow {
    /// Whether `month` (1..=12) falls inside this window, handling the
    /// Nov..Feb-style wrap-around when `start_month > end_month` (§4.5).
    pub fn contains_month(&self, month: u32) -> bool {
        let month = month as u8;
        if self.start_month <= self.end_month {
            month >= self.start_month && month <= self.end_month
        } else {
            month >= self.start_month || month <= self.end_month
        }
    }

    /// Whether `hour` (0..=23) is inside the optional hour restriction. With
    /// no hour bounds set, every hour qualifies.
    pub fn contains_hour(&self, hour: u32) -> bool {
        match (self.start_hour, self.end_hour) {
            (Some(start), Some(end)) => {
                let hour = hour as u8;
                if start <= end {
                    hour >= start && hour <= end
                } else {
                    hour >= start || hour <= end
                }
            }
            _ => true,
        }
    }
}

/// Bounds a trigger evaluates a day's (or hour's) readings against (§3).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct Conditions {
    pub temp_min: Option<f64>,
    pub temp_max: Option<f64>,
    pub wind_min: Option<f64>,
    pub wind_max: Option<f64>,
    pub precip_min: Option<f64>,
    pub precip_max: Option<f64>,
    pub humidity_min: Option<f64>,
    pub humidity_max: Option<f64>,
    /// 0 means "no consecutive-day requirement" (§8 boundary test).
    #[serde(default)]
    pub consecutive_days: u32,
    pub time_window: Option<TimeWindow>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Trigger {
    pub trigger_id: String,
    pub peril: Peril,
    pub conditions: Conditions,
    /// In `[0, 1]`.
    pub payout_ratio: f64,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Policy {
    pub policy_id: String,
    pub holder: String,
    #[serde(rename = "type")]
    pub policy_type: PolicyType,
    pub point: GeoPoint,
    pub coverage: Decimal,
    pub premium: Decimal,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub triggers: Vec<Trigger>,
}

impl Policy {
    /// Validates the invariants from §3 that aren't already enforced by the
    /// type system (non-positive coverage, empty triggers, inverted period).
    pub fn validate(&self) -> Result<(), AppError> {
        if self.policy_id.trim().is_empty() {
            return Err(AppError::BadRequest("policy_id must not be empty".into()));
        }
        if self.coverage <= Decimal::ZERO {
            return Err(AppError::BadRequest("coverage must be positive".into()));
        }
        if self.premium < Decimal::ZERO {
            return Err(AppError::BadRequest("premium must not be negative".into()));
        }
        if self.start > self.end {
            return Err(AppError::BadRequest(
                "policy start must not be after end".into(),
            ));
        }
        if self.triggers.is_empty() {
            return Err(AppError::BadRequest(
                "policy must declare at least one trigger".into(),
            ));
        }
        for t in &self.triggers {
            if !(0.0..=1.0).contains(&t.payout_ratio) {
                return Err(AppError::BadRequest(format!(
                    "trigger {} payout_ratio {} out of range [0, 1]",
                    t.trigger_id, t.payout_ratio
                )));
            }
        }
        Ok(())
    }
}

/// One hour of rolled-up weather for a single day, used only to let
/// `TimeWindow` hour bounds restrict which readings count toward a day's
/// extrema (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HourlyReading {
    /// 0..=23
    pub hour: u8,
    pub source: String,
    pub temp_c: f64,
    pub wind_mps: Option<f64>,
    pub precip_mm: Option<f64>,
    pub humidity_pct: Option<f64>,
    pub confidence: f64,
}

/// A single day's weather evidence, as supplied in a claim request or
/// synthesized for a demo scenario (§4.5, supplemented per SPEC_FULL.md).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DailyObservationInput {
    pub date: NaiveDate,
    pub hourly: Vec<HourlyReading>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Approved,
    Rejected,
    Partial,
    Pending,
    Investigate,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TriggeredPeril {
    pub peril: Peril,
    pub trigger_id: String,
    pub payout_ratio: f64,
    pub evidence: Evidence,
}

/// Per-trigger evidence supporting a firing decision (§4.5 step 3).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Evidence {
    pub qualifying_days: u32,
    pub longest_consecutive_run: u32,
    pub observed_extremum: f64,
    /// The lowest per-sample confidence among the days/hours that qualified
    /// this trigger — used for the `investigate` status threshold.
    pub confidence_floor: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ClaimDecision {
    pub claim_id: String,
    pub policy_id: String,
    pub status: ClaimStatus,
    pub triggered_perils: Vec<TriggeredPeril>,
    pub payout_amount: Decimal,
    pub evidence: Vec<Evidence>,
    pub verification_hash: String,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_window_normal_range() {
        let w = TimeWindow {
            start_month: 6,
            end_month: 8,
            start_hour: None,
            end_hour: None,
        };
        assert!(w.contains_month(7));
        assert!(!w.contains_month(9));
    }

    #[test]
    fn time_window_wraps_around_year_boundary() {
        // Nov..Feb style: fires for Dec/Jan, not Mar.
        let w = TimeWindow {
            start_month: 11,
            end_month: 2,
            start_hour: None,
            end_hour: None,
        };
        assert!(w.contains_month(12));
        assert!(w.contains_month(1));
        assert!(!w.contains_month(3));
    }

    #[test]
    fn time_window_hour_restriction() {
        let w = TimeWindow {
            start_month: 1,
            end_month: 12,
            start_hour: Some(6),
            end_hour: Some(18),
        };
        assert!(w.contains_hour(12));
        assert!(!w.contains_hour(20));
    }

    #[test]
    fn time_window_no_hour_bounds_accepts_all() {
        let w = TimeWindow {
            start_month: 1,
            end_month: 12,
            start_hour: None,
            end_hour: None,
        };
        for h in 0..24 {
            assert!(w.contains_hour(h));
        }
    }

    fn sample_policy() -> Policy {
        Policy {
            policy_id: "POL-1".into(),
            holder: "farmer@example.com".into(),
            policy_type: PolicyType::Crop,
            point: GeoPoint::new(47.0, 8.0, None, None).unwrap(),
            coverage: Decimal::new(100_000, 0),
            premium: Decimal::new(5_000, 0),
            start: "2024-06-01T00:00:00Z".parse().unwrap(),
            end: "2024-09-30T00:00:00Z".parse().unwrap(),
            triggers: vec![Trigger {
                trigger_id: "T1".into(),
                peril: Peril::HeatWave,
                conditions: Conditions {
                    temp_max: Some(35.0),
                    consecutive_days: 3,
                    ..Default::default()
                },
                payout_ratio: 0.5,
                description: "heat wave".into(),
            }],
        }
    }

    #[test]
    fn validate_accepts_well_formed_policy() {
        assert!(sample_policy().validate().is_ok());
    }

    #[test]
    fn validate_rejects_non_positive_coverage() {
        let mut p = sample_policy();
        p.coverage = Decimal::ZERO;
        assert!(p.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_triggers() {
        let mut p = sample_policy();
        p.triggers.clear();
        assert!(p.validate().is_err());
    }

    #[test]
    fn validate_rejects_inverted_period() {
        let mut p = sample_policy();
        p.end = p.start - chrono::Duration::days(1);
        assert!(p.validate().is_err());
    }
}
