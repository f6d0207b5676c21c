use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, serde_as};
use smol_str::SmolStr;
use std::time::Duration;
use url::Url;

/// Default Ordermark backend base [`Url`].
pub const DEFAULT_API_BASE_URL: &str = "https://p2p-analysis.app";

/// Configuration for one [`ListEngine`](crate::engine::ListEngine) instance.
///
/// Every field has a default, so a partial JSON document only needs to name the values it
/// overrides. Durations are expressed in milliseconds.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Base [`Url`] of the backend serving order records.
    pub api_base_url: Url,

    /// Maximum number of concurrently executing order lookups.
    pub max_concurrent: usize,

    /// Window during which reprocess triggers are coalesced into one pass.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub debounce: Duration,

    /// Delay between a history push/replace and the resulting reprocess trigger.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub history_settle: Duration,

    /// Delay between a pagination control click and the resulting reprocess trigger.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub pagination_settle: Duration,

    /// Interval at which the location is polled for silent changes.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub url_poll_interval: Duration,

    /// Delay between initialisation and the first row enumeration.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub dom_settle: Duration,

    /// Maximum time to wait for the gateway to become ready before running degraded.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub auth_wait_timeout: Duration,

    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub auth_poll_interval: Duration,

    /// Window during which an order resolved as not found is not looked up again.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub stop404_ttl: Duration,

    /// Query parameters whose change is treated as pagination.
    pub pagination_params: Vec<SmolStr>,

    /// Http request timeout for backend lookups.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub request_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            max_concurrent: 3,
            debounce: Duration::from_millis(120),
            history_settle: Duration::from_millis(100),
            pagination_settle: Duration::from_millis(500),
            url_poll_interval: Duration::from_millis(300),
            dom_settle: Duration::from_millis(500),
            auth_wait_timeout: Duration::from_secs(4),
            auth_poll_interval: Duration::from_millis(100),
            stop404_ttl: Duration::from_secs(30),
            pagination_params: vec![
                SmolStr::new_static("page"),
                SmolStr::new_static("offset"),
                SmolStr::new_static("limit"),
            ],
            request_timeout: Duration::from_secs(5),
        }
    }
}

impl EngineConfig {
    /// Deserialise an [`EngineConfig`] from a JSON document.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

fn default_api_base_url() -> Url {
    match Url::parse(DEFAULT_API_BASE_URL) {
        Ok(url) => url,
        Err(_) => unreachable!("DEFAULT_API_BASE_URL is a valid Url"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_from_partial_json() {
        let config = EngineConfig::from_json(
            r#"{
                "api_base_url": "http://localhost:8080",
                "max_concurrent": 5,
                "stop404_ttl": 1000,
                "pagination_params": ["page"]
            }"#,
        )
        .unwrap();

        assert_eq!(config.api_base_url.as_str(), "http://localhost:8080/");
        assert_eq!(config.max_concurrent, 5);
        assert_eq!(config.stop404_ttl, Duration::from_secs(1));
        assert_eq!(config.pagination_params, vec![SmolStr::new("page")]);
        assert_eq!(config.debounce, Duration::from_millis(120));
        assert_eq!(config.auth_wait_timeout, Duration::from_secs(4));
    }

    #[test]
    fn test_engine_config_round_trips_durations_as_millis() {
        let json = serde_json::to_value(EngineConfig::default()).unwrap();
        assert_eq!(json["debounce"], 120);
        assert_eq!(json["url_poll_interval"], 300);
        assert_eq!(json["api_base_url"], "https://p2p-analysis.app/");
    }

    #[test]
    fn test_engine_config_rejects_invalid_url() {
        assert!(EngineConfig::from_json(r#"{"api_base_url": "not a url"}"#).is_err());
    }
}
