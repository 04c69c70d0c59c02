//! Configuration types for the Canvas client.

use crate::auth::BearerToken;
use crate::cache::ResponseCache;
use crate::errors::{CanvasError, CanvasErrorKind, CanvasResult};
use std::sync::Arc;
use std::time::Duration;

/// Default steady-state request rate (the normal tier).
pub const DEFAULT_REQUESTS_PER_SECOND: f64 = 5.0;

/// Default quota total used when the server does not report one.
pub const DEFAULT_QUOTA_TOTAL: f64 = 700.0;

/// Default cache entry lifetime.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default User-Agent header.
pub const DEFAULT_USER_AGENT: &str = "integrations-canvas/0.1.0";

/// Default path of the capability discovery call.
pub const DEFAULT_PROBE_PATH: &str = "users/self";

/// Default maximum retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay before the first retry.
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Default upper bound for a single backoff wait.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(8);

/// Retry configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Maximum backoff delay.
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

impl RetryConfig {
    /// A configuration that never retries.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }
}

/// Canvas client configuration.
#[derive(Clone)]
pub struct CanvasConfig {
    /// API base URL, e.g. `https://school.instructure.com/api/v1`.
    pub base_url: String,
    /// Bearer credential.
    pub token: BearerToken,
    /// Normal-tier request rate.
    pub requests_per_second: f64,
    /// Act on behalf of this user id.
    pub as_user_id: Option<u64>,
    /// Shared response cache.
    pub cache: Option<Arc<ResponseCache>>,
    /// Whether GET responses are served from and stored in the cache.
    pub cache_enabled: bool,
    /// Lifetime of cached entries.
    pub cache_ttl: Duration,
    /// User-Agent header.
    pub user_agent: String,
    /// Quota total assumed when the server omits it.
    pub quota_total: f64,
    /// Retry configuration.
    pub retry: RetryConfig,
    /// Request timeout.
    pub timeout: Duration,
    /// Connect timeout.
    pub connect_timeout: Duration,
    /// Path of the capability discovery call.
    pub probe_path: String,
}

impl CanvasConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> CanvasConfigBuilder {
        CanvasConfigBuilder::new()
    }

    /// Creates a configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `CANVAS_BASE_URL` (required): API base URL
    /// - `CANVAS_TOKEN` (required): bearer access token
    /// - `CANVAS_AS_USER_ID` (optional): act-as user id
    /// - `CANVAS_REQUESTS_PER_SECOND` (optional): normal-tier rate
    /// - `CANVAS_TIMEOUT` (optional): request timeout in seconds
    /// - `CANVAS_MAX_RETRIES` (optional): maximum retries
    /// - `CANVAS_USER_AGENT` (optional): custom User-Agent
    pub fn from_env() -> CanvasResult<Self> {
        let base_url = std::env::var("CANVAS_BASE_URL").map_err(|_| {
            CanvasError::new(
                CanvasErrorKind::InvalidBaseUrl,
                "CANVAS_BASE_URL environment variable not set",
            )
        })?;

        let mut builder = CanvasConfigBuilder::new()
            .base_url(base_url)
            .token(BearerToken::from_env_var("CANVAS_TOKEN")?);

        if let Some(id) = env_parse::<u64>("CANVAS_AS_USER_ID") {
            builder = builder.as_user_id(id);
        }
        if let Some(rps) = env_parse::<f64>("CANVAS_REQUESTS_PER_SECOND") {
            builder = builder.requests_per_second(rps);
        }
        if let Some(secs) = env_parse::<u64>("CANVAS_TIMEOUT") {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        if let Some(retries) = env_parse::<u32>("CANVAS_MAX_RETRIES") {
            builder = builder.retry(RetryConfig {
                max_retries: retries,
                ..Default::default()
            });
        }
        if let Ok(ua) = std::env::var("CANVAS_USER_AGENT") {
            builder = builder.user_agent(ua);
        }

        builder.build()
    }

    /// Validates the configuration.
    pub fn validate(&self) -> CanvasResult<()> {
        if self.base_url.is_empty() {
            return Err(CanvasError::new(
                CanvasErrorKind::InvalidBaseUrl,
                "Base URL cannot be empty",
            ));
        }

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(CanvasError::new(
                CanvasErrorKind::InvalidBaseUrl,
                "Base URL must start with http:// or https://",
            ));
        }

        url::Url::parse(&self.base_url).map_err(|e| {
            CanvasError::new(CanvasErrorKind::InvalidBaseUrl, format!("Invalid base URL: {}", e))
        })?;

        if self.token.is_blank() {
            return Err(CanvasError::new(
                CanvasErrorKind::MissingCredential,
                "A bearer token is required",
            ));
        }

        if !(self.requests_per_second > 0.0) {
            return Err(CanvasError::configuration("requests_per_second must be positive"));
        }

        if !(self.quota_total > 0.0) {
            return Err(CanvasError::configuration("quota_total must be positive"));
        }

        if self.retry.initial_backoff > self.retry.max_backoff {
            return Err(CanvasError::configuration(
                "initial_backoff must not exceed max_backoff",
            ));
        }

        Ok(())
    }
}

impl std::fmt::Debug for CanvasConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CanvasConfig")
            .field("base_url", &self.base_url)
            .field("token", &"[REDACTED]")
            .field("requests_per_second", &self.requests_per_second)
            .field("as_user_id", &self.as_user_id)
            .field("cache", &self.cache.is_some())
            .field("cache_enabled", &self.cache_enabled)
            .field("user_agent", &self.user_agent)
            .field("quota_total", &self.quota_total)
            .field("retry", &self.retry)
            .finish()
    }
}

/// Builder for CanvasConfig.
#[derive(Default)]
pub struct CanvasConfigBuilder {
    base_url: Option<String>,
    token: Option<BearerToken>,
    requests_per_second: Option<f64>,
    as_user_id: Option<u64>,
    cache: Option<Arc<ResponseCache>>,
    cache_enabled: Option<bool>,
    cache_ttl: Option<Duration>,
    user_agent: Option<String>,
    quota_total: Option<f64>,
    retry: Option<RetryConfig>,
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    probe_path: Option<String>,
}

impl CanvasConfigBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the bearer credential.
    pub fn token(mut self, token: BearerToken) -> Self {
        self.token = Some(token);
        self
    }

    /// Sets the bearer credential from a raw string.
    pub fn access_token(self, token: impl Into<String>) -> Self {
        self.token(BearerToken::new(token))
    }

    /// Sets the normal-tier request rate.
    pub fn requests_per_second(mut self, rps: f64) -> Self {
        self.requests_per_second = Some(rps);
        self
    }

    /// Acts on behalf of another user.
    pub fn as_user_id(mut self, id: u64) -> Self {
        self.as_user_id = Some(id);
        self
    }

    /// Attaches a response cache; caching starts enabled.
    pub fn cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Enables or disables cache use.
    pub fn cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = Some(enabled);
        self
    }

    /// Sets the cache entry lifetime.
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Sets the User-Agent header.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Overrides the default quota total.
    pub fn quota_total(mut self, total: f64) -> Self {
        self.quota_total = Some(total);
        self
    }

    /// Sets the retry configuration.
    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = Some(config);
        self
    }

    /// Disables retries.
    pub fn no_retry(mut self) -> Self {
        self.retry = Some(RetryConfig::disabled());
        self
    }

    /// Sets the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Sets the capability discovery path.
    pub fn probe_path(mut self, path: impl Into<String>) -> Self {
        self.probe_path = Some(path.into());
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> CanvasResult<CanvasConfig> {
        let token = self.token.ok_or_else(|| {
            CanvasError::new(CanvasErrorKind::MissingCredential, "A bearer token is required")
        })?;

        let cache_enabled = self.cache_enabled.unwrap_or(self.cache.is_some());

        let config = CanvasConfig {
            base_url: self.base_url.unwrap_or_default(),
            token,
            requests_per_second: self.requests_per_second.unwrap_or(DEFAULT_REQUESTS_PER_SECOND),
            as_user_id: self.as_user_id,
            cache: self.cache,
            cache_enabled,
            cache_ttl: self.cache_ttl.unwrap_or(DEFAULT_CACHE_TTL),
            user_agent: self.user_agent.unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            quota_total: self.quota_total.unwrap_or(DEFAULT_QUOTA_TOTAL),
            retry: self.retry.unwrap_or_default(),
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
            connect_timeout: self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT),
            probe_path: self.probe_path.unwrap_or_else(|| DEFAULT_PROBE_PATH.to_string()),
        };

        config.validate()?;
        Ok(config)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> CanvasConfigBuilder {
        CanvasConfig::builder()
            .base_url("https://canvas.example.edu/api/v1")
            .access_token("7~token")
    }

    #[test]
    fn test_defaults() {
        let config = base().build().unwrap();
        assert_eq!(config.requests_per_second, DEFAULT_REQUESTS_PER_SECOND);
        assert_eq!(config.quota_total, DEFAULT_QUOTA_TOTAL);
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.initial_backoff, Duration::from_secs(1));
        assert_eq!(config.retry.max_backoff, Duration::from_secs(8));
        assert!(config.cache.is_none());
        assert!(!config.cache_enabled);
        assert!(config.as_user_id.is_none());
    }

    #[test]
    fn test_cache_enabled_by_default_when_attached() {
        let config = base().cache(Arc::new(ResponseCache::new())).build().unwrap();
        assert!(config.cache_enabled);

        let config = base()
            .cache(Arc::new(ResponseCache::new()))
            .cache_enabled(false)
            .build()
            .unwrap();
        assert!(!config.cache_enabled);
    }

    #[test]
    fn test_invalid_base_url() {
        let result = CanvasConfig::builder()
            .base_url("invalid-url")
            .access_token("t")
            .build();
        assert_eq!(result.unwrap_err().kind(), CanvasErrorKind::InvalidBaseUrl);
    }

    #[test]
    fn test_missing_token() {
        let result = CanvasConfig::builder()
            .base_url("https://canvas.example.edu/api/v1")
            .build();
        assert_eq!(result.unwrap_err().kind(), CanvasErrorKind::MissingCredential);
    }

    #[test]
    fn test_rejects_non_positive_rates() {
        assert!(base().requests_per_second(0.0).build().is_err());
        assert!(base().quota_total(-1.0).build().is_err());
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = base().build().unwrap();
        assert!(!format!("{:?}", config).contains("7~token"));
    }
}
