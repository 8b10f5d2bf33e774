//! Parametric claims evaluator (C5, §4.5): turns a policy's triggers and a
//! day-indexed observation series into a claim decision with a signed
//! audit trail.

use chrono::{Datelike, NaiveDate, Utc};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

use crate::domain::policy::{
    ClaimDecision, ClaimStatus, Conditions, DailyObservationInput, Evidence, Policy, Trigger,
    TriggeredPeril,
};
use crate::errors::AppError;

/// Per-day rollup of the fields a trigger's conditions can reference,
/// restricted to the hours `TimeWindow.start_hour..end_hour` allows (§4.5).
struct DayExtrema {
    date: NaiveDate,
    temp_min: Option<f64>,
    temp_max: Option<f64>,
    wind_min: Option<f64>,
    wind_max: Option<f64>,
    precip_total: Option<f64>,
    humidity_min: Option<f64>,
    humidity_max: Option<f64>,
    min_confidence: f64,
}

fn day_extrema(day: &DailyObservationInput, conditions: &Conditions) -> DayExtrema {
    let hours: Vec<_> = day
        .hourly
        .iter()
        .filter(|h| {
            conditions
                .time_window
                .as_ref()
                .map(|w| w.contains_hour(h.hour as u32))
                .unwrap_or(true)
        })
        .collect();

    let temps: Vec<f64> = hours.iter().map(|h| h.temp_c).collect();
    let winds: Vec<f64> = hours.iter().filter_map(|h| h.wind_mps).collect();
    let precips: Vec<f64> = hours.iter().filter_map(|h| h.precip_mm).collect();
    let humidities: Vec<f64> = hours.iter().filter_map(|h| h.humidity_pct).collect();
    let min_confidence = hours
        .iter()
        .map(|h| h.confidence)
        .fold(f64::INFINITY, f64::min);

    DayExtrema {
        date: day.date,
        temp_min: temps.iter().cloned().fold(None, fold_min),
        temp_max: temps.iter().cloned().fold(None, fold_max),
        wind_min: winds.iter().cloned().fold(None, fold_min),
        wind_max: winds.iter().cloned().fold(None, fold_max),
        precip_total: if precips.is_empty() {
            None
        } else {
            Some(precips.iter().sum())
        },
        humidity_min: humidities.iter().cloned().fold(None, fold_min),
        humidity_max: humidities.iter().cloned().fold(None, fold_max),
        min_confidence: if min_confidence.is_finite() {
            min_confidence
        } else {
            1.0
        },
    }
}

fn fold_min(acc: Option<f64>, v: f64) -> Option<f64> {
    Some(acc.map_or(v, |a| a.min(v)))
}

fn fold_max(acc: Option<f64>, v: f64) -> Option<f64> {
    Some(acc.map_or(v, |a| a.max(v)))
}

/// Whether a day's rollup satisfies every bound a trigger's conditions set
/// (unset bounds are vacuously satisfied). Exceeding a `_max` bound or
/// falling under a `_min` bound both count as the extreme condition firing
/// (§4.5: `temp_max` models heat, `temp_min` models cold, and so on for
/// wind/precip/humidity).
fn day_qualifies(day: &DayExtrema, conditions: &Conditions) -> bool {
    let month_ok = conditions
        .time_window
        .as_ref()
        .map(|w| w.contains_month(month_of(day.date)))
        .unwrap_or(true);
    if !month_ok {
        return false;
    }

    let checks = [
        bound_ok(conditions.temp_max, day.temp_max, |v, t| v >= t),
        bound_ok(conditions.temp_min, day.temp_min, |v, t| v <= t),
        bound_ok(conditions.wind_max, day.wind_max, |v, t| v >= t),
        bound_ok(conditions.wind_min, day.wind_min, |v, t| v <= t),
        bound_ok(conditions.precip_max, day.precip_total, |v, t| v >= t),
        bound_ok(conditions.precip_min, day.precip_total, |v, t| v <= t),
        bound_ok(conditions.humidity_max, day.humidity_max, |v, t| v >= t),
        bound_ok(conditions.humidity_min, day.humidity_min, |v, t| v <= t),
    ];
    checks.iter().all(|ok| *ok)
}

/// A bound that isn't set is vacuously satisfied. A bound that is set but
/// has no corresponding observed value (no hours passed the hour filter, or
/// the field was never reported) fails the day.
fn bound_ok(threshold: Option<f64>, observed: Option<f64>, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match threshold {
        None => true,
        Some(t) => observed.map(|v| cmp(v, t)).unwrap_or(false),
    }
}

fn month_of(date: NaiveDate) -> u32 {
    date.month()
}

fn longest_consecutive_run(mut dates: Vec<NaiveDate>) -> u32 {
    dates.sort();
    dates.dedup();
    let mut best = 0u32;
    let mut current = 0u32;
    let mut prev: Option<NaiveDate> = None;
    for date in dates {
        match prev {
            Some(p) if date == p.succ_opt().unwrap_or(p) => current += 1,
            _ => current = 1,
        }
        best = best.max(current);
        prev = Some(date);
    }
    best
}

fn extremum_for(conditions: &Conditions, day: &DayExtrema) -> Option<f64> {
    if conditions.temp_max.is_some() {
        day.temp_max
    } else if conditions.temp_min.is_some() {
        day.temp_min
    } else if conditions.wind_max.is_some() {
        day.wind_max
    } else if conditions.wind_min.is_some() {
        day.wind_min
    } else if conditions.precip_max.is_some() || conditions.precip_min.is_some() {
        day.precip_total
    } else if conditions.humidity_max.is_some() {
        day.humidity_max
    } else if conditions.humidity_min.is_some() {
        day.humidity_min
    } else {
        None
    }
}

fn evaluate_trigger(trigger: &Trigger, days: &[DayExtrema]) -> Option<TriggeredPeril> {
    let qualifying: Vec<&DayExtrema> = days
        .iter()
        .filter(|d| day_qualifies(d, &trigger.conditions))
        .collect();

    if qualifying.is_empty() {
        return None;
    }

    let run = longest_consecutive_run(qualifying.iter().map(|d| d.date).collect());
    let required_run = trigger.conditions.consecutive_days.max(1);
    if run < required_run {
        return None;
    }

    let extremum = qualifying
        .iter()
        .filter_map(|d| extremum_for(&trigger.conditions, d))
        .fold(None, |acc: Option<f64>, v| {
            Some(acc.map_or(v, |a: f64| if v.abs() > a.abs() { v } else { a }))
        })
        .unwrap_or(0.0);

    let confidence_floor = qualifying
        .iter()
        .map(|d| d.min_confidence)
        .fold(f64::INFINITY, f64::min);

    Some(TriggeredPeril {
        peril: trigger.peril,
        trigger_id: trigger.trigger_id.clone(),
        payout_ratio: trigger.payout_ratio,
        evidence: Evidence {
            qualifying_days: qualifying.len() as u32,
            longest_consecutive_run: run,
            observed_extremum: extremum,
            confidence_floor: if confidence_floor.is_finite() {
                confidence_floor
            } else {
                1.0
            },
        },
    })
}

/// Evaluates every trigger on `policy` against `observations` for the given
/// claim date, and produces a signed decision (§4.5).
pub fn evaluate_claim(
    policy: &Policy,
    claim_date: NaiveDate,
    observations: &[DailyObservationInput],
) -> Result<ClaimDecision, AppError> {
    if claim_date < policy.start.date_naive() || claim_date > policy.end.date_naive() {
        return Err(AppError::OutOfPolicyPeriod(policy.policy_id.clone()));
    }

    let triggered: Vec<TriggeredPeril> = policy
        .triggers
        .iter()
        .filter_map(|trigger| {
            let days: Vec<DayExtrema> = observations
                .iter()
                .map(|d| day_extrema(d, &trigger.conditions))
                .collect();
            evaluate_trigger(trigger, &days)
        })
        .collect();

    let max_ratio = triggered
        .iter()
        .map(|t| t.payout_ratio)
        .fold(0.0_f64, f64::max);
    let min_confidence_floor = triggered
        .iter()
        .map(|t| t.evidence.confidence_floor)
        .fold(f64::INFINITY, f64::min);

    let status = if triggered.is_empty() {
        ClaimStatus::Rejected
    } else if min_confidence_floor < 0.7 {
        ClaimStatus::Investigate
    } else if max_ratio < 1.0 {
        ClaimStatus::Partial
    } else {
        ClaimStatus::Approved
    };

    let payout_ratio_decimal = Decimal::from_f64(max_ratio).unwrap_or(Decimal::ZERO);
    let payout_amount = if matches!(status, ClaimStatus::Rejected | ClaimStatus::Investigate) {
        Decimal::ZERO
    } else {
        policy.coverage * payout_ratio_decimal
    };

    let claim_date_unix = claim_date
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always a valid time")
        .and_utc()
        .timestamp();
    let claim_id = format!(
        "CLM-{}",
        &hex::encode(Sha256::digest(format!(
            "{}{}",
            policy.policy_id, claim_date_unix
        )))[..16]
    );

    let verification_hash = compute_verification_hash(policy, observations, &triggered);

    Ok(ClaimDecision {
        claim_id,
        policy_id: policy.policy_id.clone(),
        status,
        evidence: triggered.iter().map(|t| t.evidence.clone()).collect(),
        triggered_perils: triggered,
        payout_amount,
        verification_hash,
        timestamp: Utc::now(),
    })
}

/// SHA-256 over the policy id, every (temperature, source) pair in the
/// supplied series, and every (peril, payout_ratio) pair that fired — an
/// auditable record of exactly what evidence a decision was based on.
fn compute_verification_hash(
    policy: &Policy,
    observations: &[DailyObservationInput],
    triggered: &[TriggeredPeril],
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(policy.policy_id.as_bytes());
    for day in observations {
        for hour in &day.hourly {
            hasher.update(format!("{:.2}", hour.temp_c).as_bytes());
            hasher.update(hour.source.as_bytes());
        }
    }
    for t in triggered {
        hasher.update(format!("{:?}", t.peril).as_bytes());
        hasher.update(format!("{:.4}", t.payout_ratio).as_bytes());
    }
    hex::encode(hasher.finalize())
}
