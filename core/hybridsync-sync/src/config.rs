//! Engine and remote connection configuration.

use crate::error::{SyncError, SyncResult};
use hybridsync_store::config::millis;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable holding the remote base URL.
pub const REMOTE_URL_ENV: &str = "HYBRIDSYNC_REMOTE_URL";
/// Environment variable holding the remote API key.
pub const API_KEY_ENV: &str = "HYBRIDSYNC_API_KEY";

/// Tuning for the background workers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    #[serde(with = "millis")]
    pub push_interval: Duration,
    #[serde(with = "millis")]
    pub pull_interval: Duration,
    #[serde(with = "millis")]
    pub change_check_interval: Duration,
    #[serde(with = "millis")]
    pub cleanup_interval: Duration,
    /// How long parked entries are kept before cleanup deletes them.
    #[serde(with = "millis")]
    pub parked_retention: Duration,
    /// Maximum queue entries pushed per cycle.
    pub batch_size: usize,
    /// Failed attempts after which an entry is parked.
    pub max_retries: u32,
    /// Push each mutation right after it is recorded.
    pub immediate_sync: bool,
    /// Concurrent immediate pushes. Further mutations wait for the PushWorker.
    pub immediate_pool_size: usize,
    /// Delay before an immediate push, so the local write settles first.
    #[serde(with = "millis")]
    pub immediate_delay: Duration,
    /// Only pull when the change detector saw a remote change.
    pub gate_pull_on_changes: bool,
    /// Upper bound on joining workers and immediate tasks at shutdown.
    #[serde(with = "millis")]
    pub shutdown_timeout: Duration,
    /// Push what is left in the queue once more while stopping.
    pub final_drain_on_shutdown: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            push_interval: Duration::from_secs(2),
            pull_interval: Duration::from_secs(3),
            change_check_interval: Duration::from_secs(60),
            cleanup_interval: Duration::from_secs(600),
            parked_retention: Duration::from_secs(24 * 60 * 60),
            batch_size: 20,
            max_retries: 3,
            immediate_sync: true,
            immediate_pool_size: 15,
            immediate_delay: Duration::from_millis(100),
            gate_pull_on_changes: true,
            shutdown_timeout: Duration::from_secs(3),
            final_drain_on_shutdown: true,
        }
    }
}

impl SyncConfig {
    /// Parses a JSON config; missing fields take their defaults.
    pub fn from_json(raw: &str) -> SyncResult<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SyncResult<()> {
        if self.batch_size == 0 {
            return Err(SyncError::Config("batch_size must be at least 1".into()));
        }
        if self.max_retries == 0 {
            return Err(SyncError::Config("max_retries must be at least 1".into()));
        }
        for (name, value) in [
            ("push_interval", self.push_interval),
            ("pull_interval", self.pull_interval),
            ("change_check_interval", self.change_check_interval),
            ("cleanup_interval", self.cleanup_interval),
        ] {
            if value.is_zero() {
                return Err(SyncError::Config(format!("{name} must be non-zero")));
            }
        }
        Ok(())
    }
}

/// Connection settings for a PostgREST-compatible remote store.
///
/// Has no `Default`; the API key must always be supplied.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL, e.g. `https://project.example.co`. `/rest/v1` is appended.
    pub base_url: String,
    pub api_key: String,
    #[serde(default = "default_request_timeout", with = "millis")]
    pub request_timeout: Duration,
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

impl RemoteConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            request_timeout: default_request_timeout(),
        }
    }

    /// Reads [`REMOTE_URL_ENV`] and [`API_KEY_ENV`].
    pub fn from_env() -> SyncResult<Self> {
        let base_url = std::env::var(REMOTE_URL_ENV)
            .map_err(|_| SyncError::Config(format!("{REMOTE_URL_ENV} is not set")))?;
        let api_key = std::env::var(API_KEY_ENV)
            .map_err(|_| SyncError::Config(format!("{API_KEY_ENV} is not set")))?;
        let config = Self::new(base_url, api_key);
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SyncResult<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(SyncError::Config(format!(
                "remote url must be http(s): {}",
                self.base_url
            )));
        }
        if self.api_key.trim().is_empty() {
            return Err(SyncError::Config("api key is empty".into()));
        }
        Ok(())
    }
}

impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}
