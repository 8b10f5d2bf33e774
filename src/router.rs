//! Single RPC surface dispatch (C6, §6): decodes the `execute_task`
//! envelope's discriminator and routes to the aggregator or the claims
//! evaluator.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use utoipa::ToSchema;

use crate::aggregator::Aggregator;
use crate::claims;
use crate::consensus::{self, temperature_field};
use crate::demo_scenarios;
use crate::domain::geo::GeoPoint;
use crate::domain::policy::{ClaimDecision, DailyObservationInput, Policy};
use crate::domain::task::{ConsensusResult, Task};
use crate::errors::AppError;
use crate::metrics;
use crate::signing;
use crate::sources::SourceRegistry;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecuteTaskPayload {
    WeatherCheck {
        latitude: f64,
        longitude: f64,
        threshold: f64,
        city: Option<String>,
        country: Option<String>,
        chain_id: Option<String>,
    },
    InsuranceClaim {
        policy: Policy,
        claim_date: NaiveDate,
        observations: Option<Vec<DailyObservationInput>>,
        #[serde(default)]
        demo_mode: bool,
        demo_scenario: Option<String>,
    },
    LiveWeatherDemo {
        latitude: f64,
        longitude: f64,
        city: Option<String>,
        country: Option<String>,
    },
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ExecuteTaskRequest {
    pub task_id: String,
    #[serde(flatten)]
    pub payload: ExecuteTaskPayload,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecuteTaskResult {
    WeatherCheck(ConsensusResult),
    InsuranceClaim(ClaimDecision),
    LiveWeatherDemo(ConsensusResult),
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ExecuteTaskResponse {
    pub task_id: String,
    pub result: ExecuteTaskResult,
}

pub struct RouterState {
    pub aggregator: Arc<Aggregator>,
    pub registry: Arc<SourceRegistry>,
    pub source_names: Vec<String>,
    pub consensus_min_sources: usize,
    pub consensus_mad_threshold: f64,
}

pub async fn execute_task(
    state: &RouterState,
    request: ExecuteTaskRequest,
) -> Result<ExecuteTaskResponse, AppError> {
    let task_id = request.task_id.clone();
    let result = match request.payload {
        ExecuteTaskPayload::WeatherCheck {
            latitude,
            longitude,
            threshold,
            city,
            country,
            chain_id,
        } => {
            let point = GeoPoint::new(latitude, longitude, city, country)?;
            if !(-100.0..=100.0).contains(&threshold) {
                return Err(AppError::BadRequest(format!(
                    "threshold {} out of range [-100, 100]",
                    threshold
                )));
            }
            let task = Task {
                id: task_id.clone(),
                point,
                threshold,
                created_at: Utc::now(),
                chain_id,
            };
            metrics::task_created();
            match state.aggregator.run(task, state.source_names.clone()).await {
                Ok(consensus_result) => {
                    metrics::task_completed();
                    ExecuteTaskResult::WeatherCheck(consensus_result)
                }
                Err(e) => {
                    metrics::task_failed(failure_label(&e));
                    return Err(e);
                }
            }
        }
        ExecuteTaskPayload::InsuranceClaim {
            policy,
            claim_date,
            observations,
            demo_mode,
            demo_scenario,
        } => {
            policy.validate()?;
            let series = if demo_mode {
                let name = demo_scenario.ok_or_else(|| {
                    AppError::BadRequest("demo_mode requires demo_scenario".into())
                })?;
                demo_scenarios::series_for(&name).ok_or_else(|| {
                    AppError::BadRequest(format!("unknown demo_scenario: {}", name))
                })?
            } else {
                observations.unwrap_or_default()
            };
            let decision = claims::evaluate_claim(&policy, claim_date, &series)?;
            metrics::claim_evaluated(status_label(&decision));
            ExecuteTaskResult::InsuranceClaim(decision)
        }
        ExecuteTaskPayload::LiveWeatherDemo {
            latitude,
            longitude,
            city,
            country,
        } => {
            let point = GeoPoint::new(latitude, longitude, city, country)?;
            let consensus_result = live_weather_demo(state, &task_id, &point).await?;
            ExecuteTaskResult::LiveWeatherDemo(consensus_result)
        }
    };

    Ok(ExecuteTaskResponse { task_id, result })
}

/// A single-shot fan-out across every registered source, consensus'd
/// directly with no task/quorum bookkeeping — for exploring live readings
/// without spinning up a full oracle task (§6, routing decision recorded in
/// SPEC_FULL.md).
async fn live_weather_demo(
    state: &RouterState,
    task_id: &str,
    point: &GeoPoint,
) -> Result<ConsensusResult, AppError> {
    let deadline = Instant::now() + Duration::from_secs(30);
    let mut observations = Vec::new();
    for source in &state.source_names {
        match state
            .registry
            .fetch(source, point, "demo", task_id, deadline)
            .await
        {
            Ok(observation) => observations.push(observation),
            Err(e) => tracing::warn!(source = source.as_str(), error = %e, "demo fetch failed"),
        }
    }

    let min_sources = state.consensus_min_sources.min(observations.len()).max(1);
    let outcome = consensus::compute(
        &observations,
        temperature_field,
        min_sources,
        state.consensus_mad_threshold,
    )?;

    let aggregated_sig = signing::sign(task_id, "demo", outcome.value);
    metrics::consensus_value(point.city.as_deref().unwrap_or("unknown"), outcome.value);

    Ok(ConsensusResult {
        task_id: task_id.to_string(),
        value: outcome.value,
        meets_threshold: false,
        confidence: outcome.confidence,
        kept_observations: outcome.kept,
        aggregated_sig,
        timestamp: Utc::now(),
    })
}

fn failure_label(error: &AppError) -> &'static str {
    match error {
        AppError::InsufficientResponses(_) => "insufficient_responses",
        AppError::InsufficientQuorum(_) => "insufficient_quorum",
        AppError::UpstreamError(_) => "upstream_error",
        _ => "other",
    }
}

fn status_label(decision: &ClaimDecision) -> &'static str {
    use crate::domain::policy::ClaimStatus::*;
    match decision.status {
        Approved => "approved",
        Rejected => "rejected",
        Partial => "partial",
        Pending => "pending",
        Investigate => "investigate",
    }
}
