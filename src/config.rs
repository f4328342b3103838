//! Per-invocation configuration for Hub access and upload staging.
//!
//! A [`HubConfig`] is built once by the caller and passed into every
//! pipeline call. Optional values resolve in a fixed order: explicit call
//! argument, then the config value, then the environment, then a
//! hard-coded fallback.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::HfstageError;

/// Environment variables consulted for a token, in order.
pub const TOKEN_ENV_VARS: [&str; 2] = ["HUGGINGFACE_TOKEN", "HF_TOKEN"];
pub const CACHE_DIR_ENV: &str = "HFSTAGE_CACHE_DIR";
pub const ENDPOINT_ENV: &str = "HF_ENDPOINT";
pub const DEFAULT_ENDPOINT: &str = "https://huggingface.co";

const DEFAULT_BACKOFF: Duration = Duration::from_secs(300);
const DEFAULT_MAX_ATTEMPTS: u32 = 4;
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Delay schedule between push attempts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backoff {
    Fixed(Duration),
    /// Doubles after every failed attempt, capped at `max`.
    Exponential { initial: Duration, max: Duration },
}

impl Backoff {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { initial, max } => {
                let shift = attempt.saturating_sub(1).min(31);
                initial.saturating_mul(1u32 << shift).min(max)
            }
        }
    }
}

/// Bounded retry policy for the push step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Always at least 1.
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Result<Self, HfstageError> {
        if max_attempts == 0 {
            return Err(HfstageError::InvalidConfig(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            max_attempts,
            backoff,
        })
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: Backoff::Fixed(DEFAULT_BACKOFF),
        }
    }
}

/// Configuration shared by the download and upload paths.
#[derive(Clone, Debug)]
pub struct HubConfig {
    pub token: Option<String>,
    pub cache_dir: PathBuf,
    pub staging_dir: Option<PathBuf>,
    pub endpoint: String,
    pub retry: RetryPolicy,
    pub http_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            token: None,
            cache_dir: PathBuf::from(".hfstage-cache"),
            staging_dir: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            retry: RetryPolicy::default(),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

impl HubConfig {
    /// Build a config from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let cache_dir = lookup(CACHE_DIR_ENV)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .or_else(|| {
                lookup("XDG_CACHE_HOME")
                    .filter(|value| !value.is_empty())
                    .map(|dir| PathBuf::from(dir).join("hfstage"))
            })
            .or_else(|| {
                lookup("HOME")
                    .filter(|value| !value.is_empty())
                    .map(|home| PathBuf::from(home).join(".cache").join("hfstage"))
            })
            .unwrap_or_else(|| PathBuf::from(".hfstage-cache"));

        let endpoint = lookup(ENDPOINT_ENV)
            .filter(|value| !value.is_empty())
            .map(|value| value.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

        Self {
            token: token_from_lookup(&lookup),
            cache_dir,
            endpoint,
            ..Self::default()
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = Some(dir.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Base directory under which per-run staging roots are created.
    pub fn staging_base(&self) -> PathBuf {
        self.staging_dir
            .clone()
            .unwrap_or_else(|| self.cache_dir.join("staging"))
    }

    /// Directory hf-hub downloads land in.
    pub fn hub_cache_dir(&self) -> PathBuf {
        self.cache_dir.join("hub")
    }

    /// Resolve the token for one call: explicit argument, then config,
    /// then environment.
    pub fn resolve_token(&self, explicit: Option<&str>) -> Option<String> {
        self.resolve_token_with(explicit, |key| std::env::var(key).ok())
    }

    pub fn resolve_token_with(
        &self,
        explicit: Option<&str>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Option<String> {
        explicit
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .or_else(|| self.token.clone().filter(|token| !token.is_empty()))
            .or_else(|| token_from_lookup(&lookup))
    }
}

fn token_from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Option<String> {
    TOKEN_ENV_VARS
        .iter()
        .filter_map(|key| lookup(key))
        .find(|value| !value.is_empty())
}
