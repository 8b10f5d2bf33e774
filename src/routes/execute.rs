//! The single RPC surface (§6): `POST /api/v1/execute_task`.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use crate::errors::AppError;
use crate::router::{self, ExecuteTaskRequest, ExecuteTaskResponse, RouterState};

#[utoipa::path(
    post,
    path = "/api/v1/execute_task",
    tag = "Oracle",
    request_body = ExecuteTaskRequest,
    responses(
        (status = 200, description = "Task executed", body = ExecuteTaskResponse),
        (status = 400, description = "Malformed envelope", body = crate::errors::ErrorResponse),
    )
)]
pub async fn execute_task(
    State(state): State<Arc<RouterState>>,
    Json(request): Json<ExecuteTaskRequest>,
) -> Result<Json<ExecuteTaskResponse>, AppError> {
    let response = router::execute_task(&state, request).await?;
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::{Aggregator, AggregatorConfig};
    use crate::executor::Executor;
    use crate::sources::cache::WeatherCache;
    use crate::sources::providers::open_meteo::OpenMeteoProvider;
    use crate::sources::providers::ProviderConfig;
    use crate::sources::SourceRegistry;
    use std::time::Duration;

    fn build_state() -> Arc<RouterState> {
        let cache = Arc::new(WeatherCache::new(100));
        let mut registry =
            SourceRegistry::new(reqwest::Client::new(), cache, Duration::from_secs(300));
        registry.register(
            Box::new(OpenMeteoProvider::new(ProviderConfig {
                base_url: "http://127.0.0.1:1".into(),
                api_key: None,
                rate_limit_per_minute: 600.0,
            })),
            600.0,
        );
        let source_names = registry.source_names();
        let registry = Arc::new(registry);
        let executor = Arc::new(Executor::new(registry.clone(), 3));
        let aggregator = Arc::new(Aggregator::new(
            vec!["op-a".into(), "op-b".into(), "op-c".into()],
            executor,
            AggregatorConfig {
                min_operators: 3,
                response_timeout: Duration::from_secs(2),
                grace_delay: Duration::from_millis(50),
                coalesce_window: Duration::from_secs(5),
                consensus_min_sources: 3,
                consensus_mad_threshold: 2.5,
            },
        ));
        Arc::new(RouterState {
            aggregator,
            registry,
            source_names,
            consensus_min_sources: 3,
            consensus_mad_threshold: 2.5,
        })
    }

    #[tokio::test]
    async fn bad_request_envelope_surfaces_as_an_error_response() {
        let state = build_state();
        let request = ExecuteTaskRequest {
            task_id: "t1".into(),
            payload: crate::router::ExecuteTaskPayload::WeatherCheck {
                latitude: 200.0,
                longitude: 0.0,
                threshold: 20.0,
                city: None,
                country: None,
                chain_id: None,
            },
        };
        let result = execute_task(State(state), Json(request)).await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn threshold_outside_celsius_range_is_a_bad_request() {
        let state = build_state();
        let request = ExecuteTaskRequest {
            task_id: "t2".into(),
            payload: crate::router::ExecuteTaskPayload::WeatherCheck {
                latitude: 47.0,
                longitude: 8.0,
                threshold: 150.0,
                city: None,
                country: None,
                chain_id: None,
            },
        };
        let result = execute_task(State(state), Json(request)).await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }
}
