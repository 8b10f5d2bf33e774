//! Task execution (C2, §4.2): fans a task's assigned sources out to the
//! registry under a concurrency bound, attenuates each reading's confidence
//! for latency and staleness, and signs the resulting operator response.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::time::Instant;

use crate::domain::geo::GeoPoint;
use crate::domain::task::OperatorResponse;
use crate::errors::AppError;
use crate::signing;
use crate::sources::SourceRegistry;

pub struct Executor {
    registry: Arc<SourceRegistry>,
    max_concurrent: usize,
}

impl Executor {
    pub fn new(registry: Arc<SourceRegistry>, max_concurrent: usize) -> Self {
        Self {
            registry,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Fetches every source assigned to this operator in parallel, bounded
    /// by `max_concurrent` in-flight requests (§4.2, §5). A source that
    /// errors is logged and dropped; the whole call only fails when every
    /// assigned source comes back empty.
    pub async fn execute(
        &self,
        operator_id: &str,
        task_id: &str,
        point: &GeoPoint,
        sources: &[String],
        deadline: Instant,
    ) -> Result<OperatorResponse, AppError> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut handles = Vec::with_capacity(sources.len());

        for source in sources {
            let semaphore = semaphore.clone();
            let registry = self.registry.clone();
            let source = source.clone();
            let point = point.clone();
            let operator_id = operator_id.to_string();
            let task_id = task_id.to_string();

            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore not closed");
                let started = Instant::now();
                let result = registry
                    .fetch(&source, &point, &operator_id, &task_id, deadline)
                    .await;
                (source, result, started.elapsed())
            }));
        }

        let mut kept = Vec::new();
        for handle in handles {
            match handle.await {
                Ok((_source, Ok(mut observation), elapsed)) => {
                    observation.confidence = attenuate(observation.confidence, elapsed, observation.measured_at);
                    kept.push(observation);
                }
                Ok((source, Err(e), _)) => {
                    tracing::warn!(
                        operator_id,
                        task_id,
                        source = source.as_str(),
                        error = %e,
                        "source fetch failed"
                    );
                }
                Err(join_err) => {
                    tracing::warn!(operator_id, task_id, error = %join_err, "source fetch task panicked");
                }
            }
        }

        if kept.is_empty() {
            return Err(AppError::UpstreamError(format!(
                "all {} assigned sources failed for operator {}",
                sources.len(),
                operator_id
            )));
        }

        let mean_temp = kept.iter().map(|o| o.temperature_c).sum::<f64>() / kept.len() as f64;
        let signature = signing::sign(operator_id, task_id, mean_temp);

        Ok(OperatorResponse {
            operator_id: operator_id.to_string(),
            task_id: task_id.to_string(),
            observations: kept,
            signature,
            timestamp: Utc::now(),
        })
    }
}

/// Attenuates a reading's confidence for fetch latency and sample age
/// (§4.2). The latency penalty is explicitly cumulative ("applied
/// cumulatively in that order"): a fetch past 10s takes both the >5s and
/// the >10s hit, not just the worse one. The age penalty's tiers aren't
/// called out as cumulative, so the worse tier alone applies.
fn attenuate(mut confidence: f64, elapsed: Duration, measured_at: chrono::DateTime<Utc>) -> f64 {
    let elapsed_secs = elapsed.as_secs_f64();
    if elapsed_secs > 5.0 {
        confidence *= 0.9;
    }
    if elapsed_secs > 10.0 {
        confidence *= 0.8;
    }

    let age = (Utc::now() - measured_at).num_seconds() as f64;
    if age > 600.0 {
        confidence *= 0.7;
    } else if age > 300.0 {
        confidence *= 0.9;
    }

    confidence.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_fresh_reading_is_unpenalized() {
        let now = Utc::now();
        assert_eq!(attenuate(1.0, Duration::from_secs(1), now), 1.0);
    }

    #[test]
    fn slow_fetch_is_penalized_cumulatively() {
        let now = Utc::now();
        let penalized = attenuate(1.0, Duration::from_secs(6), now);
        assert!((penalized - 0.9).abs() < 1e-9);
        // Past 10s both the >5s and >10s penalties apply: 0.9 * 0.8.
        let doubly_penalized = attenuate(1.0, Duration::from_secs(11), now);
        assert!((doubly_penalized - 0.9 * 0.8).abs() < 1e-9);
    }

    #[test]
    fn stale_sample_is_penalized() {
        let stale = Utc::now() - chrono::Duration::seconds(400);
        let penalized = attenuate(1.0, Duration::from_millis(10), stale);
        assert!((penalized - 0.9).abs() < 1e-9);

        let very_stale = Utc::now() - chrono::Duration::seconds(700);
        let doubly_penalized = attenuate(1.0, Duration::from_millis(10), very_stale);
        assert!((doubly_penalized - 0.7).abs() < 1e-9);
    }

    #[test]
    fn latency_and_age_penalties_compound_together() {
        let stale = Utc::now() - chrono::Duration::seconds(700);
        let penalized = attenuate(1.0, Duration::from_secs(11), stale);
        assert!((penalized - 0.9 * 0.8 * 0.7).abs() < 1e-9);
    }
}
