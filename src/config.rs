//! Client configuration, built once and injected into the clients at construction.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const BACKEND_BASE_URL_ENV: &str = "EVOC_BACKEND_BASE_URL";
pub const STORE_BASE_URL_ENV: &str = "EVOC_STORE_BASE_URL";

pub const DEFAULT_BACKEND_BASE_URL: &str = "http://localhost:5002";
pub const DEFAULT_STORE_BASE_URL: &str = "http://localhost:9000";
/// Bucket under which the backend publishes run artifacts.
pub const DEFAULT_ARTIFACT_BUCKET: &str = "code";

/// Where the backend API and the artifact object store live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoints {
    pub backend_base_url: String,
    pub store_base_url: String,
    pub artifact_bucket: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            backend_base_url: DEFAULT_BACKEND_BASE_URL.to_string(),
            store_base_url: DEFAULT_STORE_BASE_URL.to_string(),
            artifact_bucket: DEFAULT_ARTIFACT_BUCKET.to_string(),
        }
    }
}

impl Endpoints {
    /// Defaults, overridden by `EVOC_BACKEND_BASE_URL` / `EVOC_STORE_BASE_URL` when set.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let pick = |key: &str, fallback: String| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(fallback)
        };
        Self {
            backend_base_url: pick(BACKEND_BASE_URL_ENV, defaults.backend_base_url),
            store_base_url: pick(STORE_BASE_URL_ENV, defaults.store_base_url),
            artifact_bucket: defaults.artifact_bucket,
        }
    }

    pub fn new(backend_base_url: &str, store_base_url: &str) -> Self {
        Self {
            backend_base_url: backend_base_url.to_string(),
            store_base_url: store_base_url.to_string(),
            ..Self::default()
        }
    }

    pub fn backend_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.backend_base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// `{store}/{bucket}/{run_id}/{file_name}`, each segment percent-encoded.
    pub fn artifact_url(&self, run_id: &str, file_name: &str) -> Result<reqwest::Url, ConfigError> {
        if matches!(run_id, "" | "." | "..") {
            return Err(ConfigError::invalid("runId", format!("{run_id:?} is not a run id")));
        }
        let mut url = reqwest::Url::parse(&self.store_base_url)
            .map_err(|e| ConfigError::invalid("storeBaseUrl", e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| ConfigError::invalid("storeBaseUrl", "not a hierarchical URL"))?
            .pop_if_empty()
            .push(self.artifact_bucket.trim_matches('/'))
            .push(run_id)
            .push(file_name);
        Ok(url)
    }
}

/// Re-issue interval and termination bounds for status polling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollPolicy {
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Stop with a timeout after this many status queries.
    pub max_attempts: Option<u32>,
    /// Stop with a timeout once this much wall-clock time has passed.
    #[serde(with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(4000),
            max_attempts: None,
            timeout: Some(Duration::from_secs(60 * 60)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub endpoints: Endpoints,
    pub poll: PollPolicy,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoints: Endpoints::default(),
            poll: PollPolicy::default(),
            request_timeout: Duration::from_secs(30),
            user_agent: format!("evoc/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        Self {
            endpoints: Endpoints::from_env(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_overrides_replace_defaults() {
        let e = Endpoints::from_lookup(|key| match key {
            BACKEND_BASE_URL_ENV => Some("https://api.example.org/".into()),
            STORE_BASE_URL_ENV => Some("   ".into()),
            _ => None,
        });
        assert_eq!(e.backend_base_url, "https://api.example.org/");
        assert_eq!(e.store_base_url, DEFAULT_STORE_BASE_URL);
        assert_eq!(
            e.backend_url("/api/runs/run"),
            "https://api.example.org/api/runs/run"
        );
    }

    #[test]
    fn artifact_urls_are_templated_by_run() {
        let e = Endpoints::default();
        assert_eq!(
            e.artifact_url("abc123", "best.txt").unwrap().as_str(),
            "http://localhost:9000/code/abc123/best.txt"
        );
    }

    #[test]
    fn run_id_cannot_change_the_object_path() {
        let e = Endpoints::new("http://backend", "http://store:9000/prefix/");
        assert_eq!(
            e.artifact_url("a/../b?x#y", "best.txt").unwrap().as_str(),
            "http://store:9000/prefix/code/a%2F..%2Fb%3Fx%23y/best.txt"
        );
        assert!(e.artifact_url("..", "best.txt").is_err());
        assert!(Endpoints::new("http://backend", "not a url")
            .artifact_url("r1", "best.txt")
            .is_err());
    }

    #[test]
    fn poll_policy_round_trips_humantime() {
        let json = serde_json::to_value(PollPolicy::default()).unwrap();
        assert_eq!(json["interval"], "4s");
        assert_eq!(json["timeout"], "1h");
        let back: PollPolicy = serde_json::from_value(json).unwrap();
        assert_eq!(back, PollPolicy::default());
    }
}
