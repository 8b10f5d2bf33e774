//! Weather oracle core — binary entry point.
//!
//! Wires the source registry (C1), executor (C2), aggregator (C4), and
//! claims evaluator (C5) behind the single `execute_task` RPC surface (C6),
//! and exposes health/metrics/OpenAPI endpoints alongside it.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod aggregator;
mod claims;
mod config;
mod consensus;
mod demo_scenarios;
mod domain;
mod errors;
mod executor;
mod helpers;
mod metrics;
mod router;
mod routes;
mod signing;
mod sources;

use aggregator::{Aggregator, AggregatorConfig};
use config::AppConfig;
use executor::Executor;
use metrics_exporter_prometheus::PrometheusHandle;
use router::RouterState;
use sources::cache::{run_cache_sweeper, WeatherCache};
use sources::providers::{
    open_meteo::OpenMeteoProvider, openweathermap::OpenWeatherMapProvider,
    tomorrow_io::TomorrowIoProvider, visual_crossing::VisualCrossingProvider,
    weatherapi::WeatherApiProvider,
};
use sources::SourceRegistry;

/// Fixed operator pool for deterministic selection (§4.4). In this core's
/// scope (§1: the registrar/mailbox contracts are an abstract transport) the
/// pool is static configuration rather than discovered from on-chain state.
const OPERATOR_POOL: &[&str] = &["operator-1", "operator-2", "operator-3", "operator-4", "operator-5"];

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Weather Oracle Core",
        version = "0.1.0",
        description = "Trust-minimized weather consensus oracle and parametric claims \
            evaluator for parametric insurance.",
        license(name = "MIT"),
    ),
    tags(
        (name = "Health", description = "Service health check"),
        (name = "Oracle", description = "Weather verification, insurance claims, and live demo tasks"),
    ),
    paths(routes::health::health_check, routes::execute::execute_task),
    components(
        schemas(
            routes::health::HealthResponse,
            router::ExecuteTaskRequest,
            router::ExecuteTaskPayload,
            router::ExecuteTaskResult,
            router::ExecuteTaskResponse,
            domain::geo::GeoPoint,
            domain::observation::Observation,
            domain::task::ConsensusResult,
            domain::policy::Policy,
            domain::policy::PolicyType,
            domain::policy::Peril,
            domain::policy::Trigger,
            domain::policy::Conditions,
            domain::policy::TimeWindow,
            domain::policy::DailyObservationInput,
            domain::policy::HourlyReading,
            domain::policy::ClaimDecision,
            domain::policy::ClaimStatus,
            domain::policy::TriggeredPeril,
            domain::policy::Evidence,
            errors::ErrorResponse,
        )
    )
)]
struct ApiDoc;

fn build_registry(config: &AppConfig, cache: Arc<WeatherCache>) -> SourceRegistry {
    let client = reqwest::Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .expect("failed to build HTTP client");

    let mut registry = SourceRegistry::new(client, cache, config.consensus.cache_ttl);

    registry.register(
        Box::new(OpenMeteoProvider::new(config.open_meteo.clone())),
        config.open_meteo.rate_limit_per_minute,
    );
    registry.register(
        Box::new(OpenWeatherMapProvider::new(config.openweathermap.clone())),
        config.openweathermap.rate_limit_per_minute,
    );
    registry.register(
        Box::new(WeatherApiProvider::new(config.weatherapi.clone())),
        config.weatherapi.rate_limit_per_minute,
    );
    registry.register(
        Box::new(TomorrowIoProvider::new(config.tomorrow_io.clone())),
        config.tomorrow_io.rate_limit_per_minute,
    );
    registry.register(
        Box::new(VisualCrossingProvider::new(config.visual_crossing.clone())),
        config.visual_crossing.rate_limit_per_minute,
    );

    registry
}

async fn metrics_handler(
    axum::extract::State((_, handle)): axum::extract::State<(Arc<RouterState>, PrometheusHandle)>,
) -> String {
    handle.render()
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "weather_oracle_core=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env();
    let prometheus_handle = metrics::install();

    let cache = Arc::new(WeatherCache::new(config.cache.max_entries));
    let registry = build_registry(&config, cache.clone());
    let source_names = registry.source_names();
    let registry = Arc::new(registry);

    tokio::spawn(run_cache_sweeper(cache, config.cache.sweep_interval));

    let executor = Arc::new(Executor::new(registry.clone(), config.executor.max_concurrent));
    let aggregator = Arc::new(Aggregator::new(
        OPERATOR_POOL.iter().map(|s| s.to_string()).collect(),
        executor,
        AggregatorConfig {
            min_operators: config.aggregator.min_operators,
            response_timeout: config.aggregator.response_timeout,
            grace_delay: config.aggregator.grace_delay,
            coalesce_window: config.aggregator.coalesce_window,
            consensus_min_sources: config.consensus.min_sources,
            consensus_mad_threshold: config.consensus.mad_threshold,
        },
    ));

    tokio::spawn(aggregator::run_coalesce_sweeper(
        aggregator.clone(),
        config.aggregator.coalesce_window,
    ));

    let state = Arc::new(RouterState {
        aggregator,
        registry,
        source_names,
        consensus_min_sources: config.consensus.min_sources,
        consensus_mad_threshold: config.consensus.mad_threshold,
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/v1/execute_task", post(routes::execute::execute_task))
        .route("/api/v1/health", get(routes::health::health_check))
        .with_state(state.clone())
        .route(
            "/metrics",
            get(metrics_handler).with_state((state.clone(), prometheus_handle)),
        )
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("weather oracle core listening on {}", addr);
    tracing::info!(
        "Swagger UI available at http://localhost:{}/swagger-ui/",
        config.port
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind TCP listener");
    axum::serve(listener, app)
        .await
        .expect("server terminated unexpectedly");
}
