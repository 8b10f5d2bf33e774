//! Application configuration, parsed from environment variables (§6
//! "Configuration", expanded in SPEC_FULL.md's `[AMBIENT] Configuration`
//! section). Mirrors the teacher's `AppConfig::from_env()` pattern: a flat
//! struct built once at startup, no hot reload.

use std::time::Duration;

use crate::sources::providers::ProviderConfig;

#[derive(Debug, Clone)]
pub struct AggregatorSettings {
    pub min_operators: usize,
    pub response_timeout: Duration,
    pub grace_delay: Duration,
    pub coalesce_window: Duration,
}

#[derive(Debug, Clone)]
pub struct ConsensusSettings {
    pub min_sources: usize,
    pub mad_threshold: f64,
    pub cache_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub max_concurrent: usize,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub max_entries: usize,
    pub sweep_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub user_agent: String,
    pub aggregator: AggregatorSettings,
    pub consensus: ConsensusSettings,
    pub executor: ExecutorSettings,
    pub cache: CacheSettings,
    pub open_meteo: ProviderConfig,
    pub openweathermap: ProviderConfig,
    pub weatherapi: ProviderConfig,
    pub tomorrow_io: ProviderConfig,
    pub visual_crossing: ProviderConfig,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn provider_config(name: &str, default_base_url: &str, default_rate_limit: f64) -> ProviderConfig {
    ProviderConfig {
        base_url: env_or(
            &format!("WEATHER_API_{}_BASE_URL", name),
            default_base_url,
        ),
        api_key: std::env::var(format!("WEATHER_API_{}_API_KEY", name)).ok(),
        rate_limit_per_minute: env_parse(
            &format!("WEATHER_API_{}_RATE_LIMIT", name),
            default_rate_limit,
        ),
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env_parse("PORT", 8080),
            user_agent: env_or(
                "ORACLE_USER_AGENT",
                "weather-oracle-core/0.1 (+https://github.com/weather-oracle)",
            ),
            aggregator: AggregatorSettings {
                min_operators: env_parse("AGGREGATOR_MIN_OPERATORS", 3),
                response_timeout: Duration::from_secs(env_parse(
                    "AGGREGATOR_RESPONSE_TIMEOUT_SECS",
                    60,
                )),
                grace_delay: Duration::from_secs(env_parse("AGGREGATOR_GRACE_DELAY_SECS", 2)),
                coalesce_window: Duration::from_secs(env_parse(
                    "AGGREGATOR_COALESCE_WINDOW_SECS",
                    5,
                )),
            },
            consensus: ConsensusSettings {
                min_sources: env_parse("CONSENSUS_MIN_SOURCES", 3),
                mad_threshold: env_parse("CONSENSUS_MAD_THRESHOLD", 2.5),
                cache_ttl: Duration::from_secs(env_parse("CONSENSUS_CACHE_TTL_SECS", 300)),
            },
            executor: ExecutorSettings {
                max_concurrent: env_parse("EXECUTOR_MAX_CONCURRENT", 3),
            },
            cache: CacheSettings {
                max_entries: env_parse("CACHE_MAX_ENTRIES", 10_000),
                sweep_interval: Duration::from_secs(env_parse("CACHE_SWEEP_INTERVAL_SECS", 60)),
            },
            open_meteo: provider_config("OPEN_METEO", "https://api.open-meteo.com", 600.0),
            openweathermap: provider_config(
                "OPENWEATHERMAP",
                "https://api.openweathermap.org",
                60.0,
            ),
            weatherapi: provider_config("WEATHERAPI", "https://api.weatherapi.com", 60.0),
            tomorrow_io: provider_config("TOMORROW_IO", "https://api.tomorrow.io", 25.0),
            visual_crossing: provider_config(
                "VISUAL_CROSSING",
                "https://weather.visualcrossing.com",
                1000.0,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_env_unset() {
        // Exercises the parsing path directly rather than mutating process
        // env vars, which `cargo test`'s parallel runner makes unsafe to
        // share across tests (mirrors the teacher's noted caveat).
        assert_eq!(env_parse::<u16>("WEATHER_ORACLE_UNSET_PORT_KEY", 8080), 8080);
        assert_eq!(
            env_or("WEATHER_ORACLE_UNSET_STRING_KEY", "fallback"),
            "fallback"
        );
    }

    #[test]
    fn provider_config_falls_back_to_defaults() {
        let cfg = provider_config("UNSET_TEST_PROVIDER", "https://example.test", 42.0);
        assert_eq!(cfg.base_url, "https://example.test");
        assert_eq!(cfg.rate_limit_per_minute, 42.0);
        assert!(cfg.api_key.is_none());
    }
}
