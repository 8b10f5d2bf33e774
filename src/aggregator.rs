//! Task orchestration (C4, §4.4): owns the task store, the deterministic
//! operator shuffle, response collection, and the idempotent aggregation
//! step that turns collected operator responses into a `ConsensusResult`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use rand::rngs::StdRng;
use rand::SeedableRng;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use crate::consensus::{self, temperature_field};
use crate::domain::geo::GeoPoint;
use crate::domain::task::{
    FailureReason, OperatorId, OperatorResponse, SourceId, Task, TaskId, TaskState, TaskStatus,
};
use crate::errors::AppError;
use crate::executor::Executor;
use crate::signing;

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub min_operators: usize,
    pub response_timeout: StdDuration,
    pub grace_delay: StdDuration,
    pub coalesce_window: StdDuration,
    pub consensus_min_sources: usize,
    pub consensus_mad_threshold: f64,
}

struct CoalesceEntry {
    task_id: TaskId,
    registered_at: DateTime<Utc>,
}

pub struct Aggregator {
    tasks: RwLock<HashMap<TaskId, TaskState>>,
    coalesce: RwLock<HashMap<String, CoalesceEntry>>,
    operator_pool: Vec<OperatorId>,
    executor: Arc<Executor>,
    config: AggregatorConfig,
}

impl Aggregator {
    pub fn new(operator_pool: Vec<OperatorId>, executor: Arc<Executor>, config: AggregatorConfig) -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            coalesce: RwLock::new(HashMap::new()),
            operator_pool,
            executor,
            config,
        }
    }

    /// Deterministic Fisher-Yates shuffle of the operator pool, seeded from
    /// `SHA-256(task_id)` so every node reproduces the same assignment for a
    /// given task without coordination (§4.4, Open Question (b)).
    fn shuffled_operators(&self, task_id: &str) -> Vec<OperatorId> {
        let mut hasher = Sha256::new();
        hasher.update(task_id.as_bytes());
        let digest = hasher.finalize();
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&digest);

        let mut rng = StdRng::from_seed(seed);
        let mut pool = self.operator_pool.clone();
        // Fisher-Yates, high to low.
        for i in (1..pool.len()).rev() {
            let j = rand::Rng::gen_range(&mut rng, 0..=i);
            pool.swap(i, j);
        }
        pool
    }

    pub async fn create_task(&self, task: Task) -> Result<(), AppError> {
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&task.id) {
            return Err(AppError::DuplicateTaskId(task.id));
        }
        let deadline = task.created_at + ChronoDuration::from_std(self.config.response_timeout)
            .unwrap_or_else(|_| ChronoDuration::seconds(60));
        tasks.insert(task.id.clone(), TaskState::new(task, deadline));
        Ok(())
    }

    /// Assigns operators (deterministic shuffle, first `min_operators` or
    /// the whole pool if smaller) and shards `all_sources` contiguously
    /// across them (§4.4).
    pub async fn distribute(&self, task_id: &str, all_sources: &[SourceId]) -> Result<(), AppError> {
        let operators = self.shuffled_operators(task_id);
        let chosen_count = self.config.min_operators.min(operators.len()).max(1);
        let chosen: Vec<OperatorId> = operators.into_iter().take(chosen_count).collect();

        let mut assignments: HashMap<OperatorId, Vec<SourceId>> = HashMap::new();
        if !all_sources.is_empty() {
            let chunk_size = (all_sources.len() + chosen.len() - 1) / chosen.len();
            for (i, operator) in chosen.iter().enumerate() {
                // Contiguous chunks, wrapping the start index back to 0 once
                // the source list is exhausted (§4.4) rather than handing an
                // operator an empty slice.
                let start = (i * chunk_size) % all_sources.len();
                let end = (start + chunk_size).min(all_sources.len());
                assignments.insert(operator.clone(), all_sources[start..end].to_vec());
            }
        }

        let mut tasks = self.tasks.write().await;
        let state = tasks
            .get_mut(task_id)
            .ok_or_else(|| AppError::NotFound(task_id.to_string()))?;
        if !state.status.can_transition_to(TaskStatus::Distributed) {
            return Err(AppError::InternalError(format!(
                "task {} cannot be distributed from status {:?}",
                task_id, state.status
            )));
        }
        state.committed_operators = chosen;
        state.source_assignments = assignments;
        state.status = TaskStatus::Distributed;
        Ok(())
    }

    pub async fn collect_response(&self, response: OperatorResponse) -> Result<(), AppError> {
        let mut tasks = self.tasks.write().await;
        let state = tasks
            .get_mut(&response.task_id)
            .ok_or_else(|| AppError::NotFound(response.task_id.clone()))?;

        if !state.committed_operators.contains(&response.operator_id) {
            return Err(AppError::UnassignedOperator {
                operator: response.operator_id,
                task_id: response.task_id,
            });
        }
        if state
            .responses
            .iter()
            .any(|r| r.operator_id == response.operator_id)
        {
            return Err(AppError::DuplicateResponse {
                operator: response.operator_id,
                task_id: response.task_id,
            });
        }

        if state.status == TaskStatus::Distributed {
            state.status = TaskStatus::Executing;
        }
        state.responses.push(response);
        Ok(())
    }

    /// Idempotent: calling this after the task has already reached a
    /// terminal state just returns the stored result/failure without
    /// recomputing anything (§9, Open Question (a)).
    pub async fn try_aggregate(&self, task_id: &str) -> Result<Option<crate::domain::task::ConsensusResult>, AppError> {
        let mut tasks = self.tasks.write().await;
        let state = tasks
            .get_mut(task_id)
            .ok_or_else(|| AppError::NotFound(task_id.to_string()))?;

        if state.status.is_terminal() {
            return Ok(state.result.clone());
        }

        if state.responses.len() < self.config.min_operators {
            if Utc::now() >= state.deadline {
                state.status = TaskStatus::Failed;
                state.failure_reason = Some(FailureReason::InsufficientResponses);
            }
            return Ok(None);
        }

        if state.status == TaskStatus::Executing {
            state.status = TaskStatus::Aggregating;
        }

        let verified_observations: Vec<_> = state
            .responses
            .iter()
            .filter(|r| {
                let mean = response_mean_temperature(r);
                signing::verify(&r.signature, &r.operator_id, &r.task_id, mean)
            })
            .flat_map(|r| r.observations.clone())
            .collect();

        let outcome = consensus::compute(
            &verified_observations,
            temperature_field,
            self.config.consensus_min_sources,
            self.config.consensus_mad_threshold,
        );

        match outcome {
            Ok(result) => {
                let consensus_result = crate::domain::task::ConsensusResult {
                    task_id: task_id.to_string(),
                    value: result.value,
                    meets_threshold: result.value >= state.task.threshold,
                    confidence: result.confidence,
                    kept_observations: result.kept,
                    aggregated_sig: task_aggregated_signature(&state.responses),
                    timestamp: Utc::now(),
                };
                state.status = TaskStatus::Completed;
                state.result = Some(consensus_result.clone());
                Ok(Some(consensus_result))
            }
            Err(_) => {
                state.status = TaskStatus::Failed;
                state.failure_reason = Some(FailureReason::InsufficientQuorum);
                Ok(None)
            }
        }
    }

    /// End-to-end orchestration for one task: create, distribute, fan each
    /// assigned operator's fetch out to the executor, collect responses
    /// (waiting `grace_delay` past the quorum threshold for stragglers), and
    /// aggregate (§4.2-§4.4).
    pub async fn run(
        &self,
        task: Task,
        all_sources: Vec<SourceId>,
    ) -> Result<crate::domain::task::ConsensusResult, AppError> {
        let task_id = task.id.clone();
        let point = task.point.clone();
        self.create_task(task).await?;

        let distribution_start = tokio::time::Instant::now();
        self.distribute(&task_id, &all_sources).await?;
        crate::metrics::task_duration_seconds("distribution", distribution_start.elapsed().as_secs_f64());

        let assignments = {
            let tasks = self.tasks.read().await;
            tasks
                .get(&task_id)
                .expect("just distributed")
                .source_assignments
                .clone()
        };

        let execution_start = tokio::time::Instant::now();
        let deadline = tokio::time::Instant::now() + self.config.response_timeout;
        let mut in_flight = FuturesUnordered::new();
        for (operator_id, sources) in assignments {
            let executor = self.executor.clone();
            let point = point.clone();
            let task_id = task_id.clone();
            in_flight.push(async move {
                executor
                    .execute(&operator_id, &task_id, &point, &sources, deadline)
                    .await
            });
        }

        let min_operators = self.config.min_operators;
        let grace_delay = self.config.grace_delay;
        let mut collected = 0usize;
        let mut grace_timer: Option<tokio::time::Instant> = None;

        loop {
            let remaining_grace = grace_timer.map(|t| t.saturating_duration_since(tokio::time::Instant::now()));
            tokio::select! {
                next = in_flight.next(), if !in_flight.is_empty() => {
                    match next {
                        Some(Ok(response)) => {
                            if self.collect_response(response).await.is_ok() {
                                collected += 1;
                                if collected >= min_operators && grace_timer.is_none() {
                                    grace_timer = Some(tokio::time::Instant::now() + grace_delay);
                                }
                            }
                        }
                        Some(Err(e)) => {
                            tracing::warn!(task_id = task_id.as_str(), error = %e, "operator execution failed");
                        }
                        None => break,
                    }
                }
                _ = tokio::time::sleep(remaining_grace.unwrap_or(StdDuration::from_secs(u64::MAX))), if grace_timer.is_some() => {
                    break;
                }
            }
        }

        crate::metrics::task_duration_seconds("execution", execution_start.elapsed().as_secs_f64());

        let aggregation_start = tokio::time::Instant::now();
        let result = self
            .try_aggregate(&task_id)
            .await?
            .ok_or_else(|| AppError::InsufficientResponses(task_id.clone()));
        crate::metrics::task_duration_seconds("aggregation", aggregation_start.elapsed().as_secs_f64());

        if let Ok(consensus_result) = &result {
            let city = point.city.as_deref().unwrap_or("unknown");
            crate::metrics::consensus_value(city, consensus_result.value);
        }

        result
    }

    /// Polling fallback for callers that create/distribute out-of-band and
    /// just want to wait on the result (§4.4's `WaitForCompletion`).
    pub async fn wait_for_completion(&self, task_id: &str) -> Result<TaskState, AppError> {
        loop {
            {
                let tasks = self.tasks.read().await;
                let state = tasks
                    .get(task_id)
                    .ok_or_else(|| AppError::NotFound(task_id.to_string()))?;
                if state.status.is_terminal() {
                    return Ok(state.clone());
                }
            }
            self.try_aggregate(task_id).await?;
            tokio::time::sleep(StdDuration::from_millis(500)).await;
        }
    }

    /// Returns an existing task id already registered for this location's
    /// coalescing bucket within the coalesce window, if any (§4.4).
    pub async fn check_coalesce(&self, point: &GeoPoint) -> Option<TaskId> {
        let bucket = point.rounded_key();
        let coalesce = self.coalesce.read().await;
        coalesce.get(&bucket).and_then(|entry| {
            let age = Utc::now() - entry.registered_at;
            if age <= ChronoDuration::from_std(self.config.coalesce_window).unwrap_or_default() {
                Some(entry.task_id.clone())
            } else {
                None
            }
        })
    }

    pub async fn register_coalesce(&self, point: &GeoPoint, task_id: TaskId) {
        let mut coalesce = self.coalesce.write().await;
        coalesce.insert(
            point.rounded_key(),
            CoalesceEntry {
                task_id,
                registered_at: Utc::now(),
            },
        );
    }

    async fn sweep_coalesce(&self) {
        let mut coalesce = self.coalesce.write().await;
        let window = ChronoDuration::from_std(self.config.coalesce_window).unwrap_or_default();
        let now = Utc::now();
        coalesce.retain(|_, entry| now - entry.registered_at <= window);
    }

    pub async fn get_task(&self, task_id: &str) -> Option<TaskState> {
        self.tasks.read().await.get(task_id).cloned()
    }
}

/// Runs forever, purging stale coalescing entries on a fixed interval.
pub async fn run_coalesce_sweeper(aggregator: Arc<Aggregator>, interval: StdDuration) {
    loop {
        tokio::time::sleep(interval).await;
        aggregator.sweep_coalesce().await;
    }
}

fn response_mean_temperature(response: &OperatorResponse) -> f64 {
    if response.observations.is_empty() {
        return 0.0;
    }
    response.observations.iter().map(|o| o.temperature_c).sum::<f64>() / response.observations.len() as f64
}

/// The task-level aggregated signature §4.4 stores on a completed task's
/// `ConsensusResult`: SHA-256 over `operator_id || operator_sig ||
/// timestamp_string` for every accepted response, in acceptance order.
/// Distinct from C3's per-field aggregated signature (§4.3 step 7), which
/// hashes kept observations rather than operator responses.
fn task_aggregated_signature(responses: &[OperatorResponse]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    for response in responses {
        hasher.update(response.operator_id.as_bytes());
        hasher.update(&response.signature);
        hasher.update(response.timestamp.to_rfc3339().as_bytes());
    }
    hasher.finalize().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::geo::GeoPoint;
    use crate::sources::cache::WeatherCache;
    use crate::sources::providers::{ProviderConfig, RawReading, WeatherSource};
    use crate::sources::SourceRegistry;
    use async_trait::async_trait;

    struct StubProvider;

    #[async_trait]
    impl WeatherSource for StubProvider {
        fn name(&self) -> &str {
            "StubSource"
        }

        async fn fetch_raw(
            &self,
            _client: &reqwest::Client,
            _point: &GeoPoint,
        ) -> Result<RawReading, AppError> {
            Ok(RawReading {
                temperature_c: 20.0,
                humidity_pct: Some(50.0),
                wind_mps: Some(2.0),
                precip_mm: Some(0.0),
                pressure_hpa: Some(1013.0),
                measured_at: None,
                confidence: None,
            })
        }
    }

    fn sample_task(id: &str) -> Task {
        Task {
            id: id.to_string(),
            point: GeoPoint::new(10.0, 10.0, None, None).unwrap(),
            threshold: 0.0,
            created_at: Utc::now(),
            chain_id: None,
        }
    }

    fn build_aggregator(min_operators: usize) -> Aggregator {
        let cache = Arc::new(WeatherCache::new(100));
        let mut registry = SourceRegistry::new(reqwest::Client::new(), cache, StdDuration::from_secs(300));
        registry.register(Box::new(StubProvider), 6000.0);
        registry.register(
            Box::new(crate::sources::providers::open_meteo::OpenMeteoProvider::new(ProviderConfig {
                base_url: "http://127.0.0.1:1".into(),
                api_key: None,
                rate_limit_per_minute: 6000.0,
            })),
            6000.0,
        );
        let executor = Arc::new(Executor::new(Arc::new(registry), 4));
        Aggregator::new(
            vec!["op-a".into(), "op-b".into(), "op-c".into()],
            executor,
            AggregatorConfig {
                min_operators,
                response_timeout: StdDuration::from_secs(5),
                grace_delay: StdDuration::from_millis(50),
                coalesce_window: StdDuration::from_secs(5),
                consensus_min_sources: 1,
                consensus_mad_threshold: 2.5,
            },
        )
    }

    #[test]
    fn shuffle_is_deterministic_for_the_same_task_id() {
        let aggregator = build_aggregator(2);
        let a = aggregator.shuffled_operators("task-1");
        let b = aggregator.shuffled_operators("task-1");
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn duplicate_task_id_is_rejected() {
        let aggregator = build_aggregator(1);
        aggregator.create_task(sample_task("t1")).await.unwrap();
        let result = aggregator.create_task(sample_task("t1")).await;
        assert!(matches!(result, Err(AppError::DuplicateTaskId(_))));
    }

    #[tokio::test]
    async fn unassigned_operator_is_rejected() {
        let aggregator = build_aggregator(1);
        aggregator.create_task(sample_task("t1")).await.unwrap();
        aggregator.distribute("t1", &["StubSource".into()]).await.unwrap();

        let response = OperatorResponse {
            operator_id: "not-assigned".into(),
            task_id: "t1".into(),
            observations: vec![],
            signature: vec![],
            timestamp: Utc::now(),
        };
        let result = aggregator.collect_response(response).await;
        assert!(matches!(result, Err(AppError::UnassignedOperator { .. })));
    }

    #[tokio::test]
    async fn run_reaches_consensus_with_a_single_stub_source() {
        let aggregator = build_aggregator(1);
        let task = sample_task("t-run");
        let result = aggregator.run(task, vec!["StubSource".into()]).await.unwrap();
        assert_eq!(result.value, 20.0);
    }

    #[test]
    fn task_level_signature_is_distinct_from_the_consensus_field_signature() {
        let responses = vec![OperatorResponse {
            operator_id: "op-a".into(),
            task_id: "t1".into(),
            observations: vec![],
            signature: signing::sign("op-a", "t1", 20.0),
            timestamp: Utc::now(),
        }];
        let sig = task_aggregated_signature(&responses);
        assert_ne!(sig, responses[0].signature, "must hash over the response, not echo it");
    }

    #[test]
    fn task_level_signature_is_deterministic_for_identical_input() {
        let timestamp = Utc::now();
        let response = |op: &str| OperatorResponse {
            operator_id: op.into(),
            task_id: "t1".into(),
            observations: vec![],
            signature: signing::sign(op, "t1", 20.0),
            timestamp,
        };
        let a = task_aggregated_signature(&[response("op-a"), response("op-b")]);
        let b = task_aggregated_signature(&[response("op-a"), response("op-b")]);
        assert_eq!(a, b);
    }
}
