//! Process metrics (C7), exported on `GET /metrics` in Prometheus text
//! format via `metrics-exporter-prometheus`.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Installs the global recorder once at startup and returns the handle the
/// `/metrics` route renders from.
pub fn install() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install the Prometheus metrics recorder")
}

pub fn task_created() {
    counter!("weather_oracle_tasks_created_total").increment(1);
}

pub fn task_completed() {
    counter!("weather_oracle_tasks_completed_total").increment(1);
}

pub fn task_failed(reason: &'static str) {
    counter!("weather_oracle_tasks_failed_total", "reason" => reason).increment(1);
}

pub fn task_duration_seconds(phase: &'static str, seconds: f64) {
    histogram!("weather_oracle_task_duration_seconds", "phase" => phase).record(seconds);
}

pub fn consensus_value(city: &str, value: f64) {
    gauge!("weather_oracle_consensus_value", "city" => city.to_string()).set(value);
}

pub fn active_sources(count: usize) {
    gauge!("weather_oracle_active_sources").set(count as f64);
}

pub fn claim_evaluated(status: &'static str) {
    counter!("weather_oracle_claims_evaluated_total", "status" => status).increment(1);
}
