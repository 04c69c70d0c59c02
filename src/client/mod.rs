//! Canvas API client implementation.
//!
//! Every logical call flows through the same pipeline: cache lookup (GET
//! only), rate governor slot, authenticated send under the backoff policy,
//! quota feedback, one-time capability discovery, cache fill.

mod response;

pub use response::RawResponse;

use response::error_from_response;

use crate::cache::{CacheKey, CacheStats, CachedResponse, ResponseCache, AS_USER_PARAM};
use crate::capabilities::{CapabilityDescriptor, CapabilityProbe};
use crate::config::{CanvasConfig, CanvasConfigBuilder, RetryConfig};
use crate::errors::{CanvasError, CanvasErrorKind, CanvasResult};
use crate::observability::{Metrics, MetricsSnapshot, RequestTimer, TracingHooks};
use crate::pagination::{Page, Paginator};
use crate::resilience::{BackoffPolicy, CallScope, RateGovernor};
use crate::services::{AssignmentGroupsService, ProgressService, SubmissionsService};
use bytes::Bytes;
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, Method};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use url::Url;

/// Header reporting the remaining request quota.
pub const RATE_LIMIT_REMAINING_HEADER: &str = "x-rate-limit-remaining";

/// Header reporting the total request quota.
pub const RATE_LIMIT_TOTAL_HEADER: &str = "x-rate-limit-total";

/// State shared by every clone of a client.
struct ClientInner {
    http: Client,
    config: CanvasConfig,
    base_url: Url,
    governor: RateGovernor,
    backoff: BackoffPolicy,
    cache: Option<Arc<ResponseCache>>,
    cache_enabled: AtomicBool,
    quota_total: Mutex<f64>,
    probe: CapabilityProbe,
    metrics: Arc<Metrics>,
}

/// Canvas API client.
///
/// Cloning is cheap; clones share the rate governor, cache, quota and
/// capability state. [`CanvasClient::with_cancellation`] and
/// [`CanvasClient::with_deadline`] produce clones whose calls observe a
/// caller-supplied signal.
#[derive(Clone)]
pub struct CanvasClient {
    inner: Arc<ClientInner>,
    scope: CallScope,
}

impl CanvasClient {
    /// Creates a new Canvas client.
    pub fn new(config: CanvasConfig) -> CanvasResult<Self> {
        config.validate()?;

        let base_url = Url::parse(&config.base_url).map_err(|e| {
            CanvasError::new(
                CanvasErrorKind::InvalidBaseUrl,
                format!("Invalid base URL: {}", e),
            )
        })?;

        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| {
                CanvasError::configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        let inner = ClientInner {
            http,
            base_url,
            governor: RateGovernor::new(config.requests_per_second),
            backoff: BackoffPolicy::from_config(&config.retry),
            cache: config.cache.clone(),
            cache_enabled: AtomicBool::new(config.cache_enabled),
            quota_total: Mutex::new(config.quota_total),
            probe: CapabilityProbe::new(),
            metrics: Arc::new(Metrics::new()),
            config,
        };

        tracing::debug!(
            base_url = %inner.base_url,
            token = %inner.config.token.hint(),
            as_user_id = ?inner.config.as_user_id,
            "Canvas client created"
        );

        Ok(Self {
            inner: Arc::new(inner),
            scope: CallScope::new(),
        })
    }

    /// Creates a new client builder.
    pub fn builder() -> CanvasClientBuilder {
        CanvasClientBuilder::new()
    }

    /// Returns a clone whose calls are cancelled when `token` fires.
    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        let mut scope = CallScope::with_token(token);
        if let Some(deadline) = self.scope.deadline_at() {
            scope = scope.deadline(deadline);
        }
        Self {
            inner: self.inner.clone(),
            scope,
        }
    }

    /// Returns a clone whose calls fail once `deadline` passes.
    pub fn with_deadline(&self, deadline: tokio::time::Instant) -> Self {
        Self {
            inner: self.inner.clone(),
            scope: self.scope.clone().deadline(deadline),
        }
    }

    /// Returns a clone whose calls fail `timeout` from now.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(tokio::time::Instant::now() + timeout)
    }

    /// Gets the base URL.
    pub fn base_url(&self) -> &str {
        self.inner.base_url.as_str()
    }

    /// Gets the configuration.
    pub fn config(&self) -> &CanvasConfig {
        &self.inner.config
    }

    // Service accessors

    /// Gets the assignment groups service.
    pub fn assignment_groups(&self) -> AssignmentGroupsService<'_> {
        AssignmentGroupsService::new(self)
    }

    /// Gets the submissions service.
    pub fn submissions(&self) -> SubmissionsService<'_> {
        SubmissionsService::new(self)
    }

    /// Gets the progress service.
    pub fn progress(&self) -> ProgressService<'_> {
        ProgressService::new(self)
    }

    // Shared state

    /// Gets the rate governor.
    pub fn governor(&self) -> &RateGovernor {
        &self.inner.governor
    }

    /// Gets the active request rate.
    pub fn current_rate(&self) -> f64 {
        self.inner.governor.current_rate()
    }

    /// Overrides the quota total used when responses omit it.
    pub fn set_quota_total(&self, total: f64) {
        *self.inner.quota_total.lock() = total;
    }

    /// Gets the quota total used when responses omit it.
    pub fn quota_total(&self) -> f64 {
        *self.inner.quota_total.lock()
    }

    /// Enables or disables the response cache for subsequent calls.
    pub fn set_cache_enabled(&self, enabled: bool) {
        self.inner.cache_enabled.store(enabled, Ordering::Release);
    }

    /// Returns true if a cache is attached and enabled.
    pub fn cache_enabled(&self) -> bool {
        self.inner.cache.is_some() && self.inner.cache_enabled.load(Ordering::Acquire)
    }

    /// Drops every cached response.
    pub fn clear_cache(&self) {
        if let Some(cache) = &self.inner.cache {
            cache.clear();
        }
    }

    /// Gets cache statistics, if a cache is attached.
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.inner.cache.as_ref().map(|c| c.stats())
    }

    /// Gets the published capability descriptor. Never waits for discovery.
    pub fn capabilities(&self) -> Option<Arc<CapabilityDescriptor>> {
        self.inner.probe.descriptor()
    }

    /// Gets the server version, absent until discovery has completed.
    pub fn version(&self) -> Option<String> {
        self.inner.probe.version()
    }

    /// Returns true only if discovery completed and advertised `feature`.
    pub fn supports_feature(&self, feature: &str) -> bool {
        self.inner.probe.supports_feature(feature)
    }

    /// Gets a snapshot of request metrics.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    // HTTP methods

    /// Makes a GET request and decodes the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> CanvasResult<T> {
        self.execute(Method::GET, path, Option::<&()>::None)
            .await?
            .json()
    }

    /// Makes a GET request that bypasses the response cache.
    pub async fn get_json_uncached<T: DeserializeOwned>(&self, path: &str) -> CanvasResult<T> {
        self.dispatch(Method::GET, path, Option::<&()>::None, false)
            .await?
            .json()
    }

    /// Makes a GET request with query parameters.
    pub async fn get_json_with_params<T: DeserializeOwned, P: Serialize>(
        &self,
        path: &str,
        params: &P,
    ) -> CanvasResult<T> {
        let target = with_query(path, params)?;
        self.get_json(&target).await
    }

    /// Makes a POST request with a JSON body.
    pub async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> CanvasResult<T> {
        self.execute(Method::POST, path, Some(body)).await?.json()
    }

    /// Makes a PUT request with a JSON body.
    pub async fn put_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> CanvasResult<T> {
        self.execute(Method::PUT, path, Some(body)).await?.json()
    }

    /// Makes a DELETE request.
    pub async fn delete(&self, path: &str) -> CanvasResult<()> {
        self.execute(Method::DELETE, path, Option::<&()>::None)
            .await?;
        Ok(())
    }

    /// Fetches one page of a list endpoint.
    pub async fn get_page<T: DeserializeOwned>(&self, target: &str) -> CanvasResult<Page<T>> {
        let response = self.execute(Method::GET, target, Option::<&()>::None).await?;
        let items: Vec<T> = response.json()?;
        Ok(Page::new(items, response.links().clone()))
    }

    /// Starts a page-by-page walk of a list endpoint.
    pub fn paginate<T: DeserializeOwned>(&self, path: &str) -> Paginator<'_, T> {
        Paginator::new(self, path)
    }

    /// Fetches every page of a list endpoint and concatenates the items.
    pub async fn get_all_pages<T: DeserializeOwned>(&self, path: &str) -> CanvasResult<Vec<T>> {
        self.paginate(path).collect_all().await
    }

    /// Fetches every page of a list endpoint with query parameters.
    pub async fn get_all_pages_with_params<T: DeserializeOwned, P: Serialize>(
        &self,
        path: &str,
        params: &P,
    ) -> CanvasResult<Vec<T>> {
        let target = with_query(path, params)?;
        self.get_all_pages(&target).await
    }

    /// Runs one logical request through the full pipeline.
    pub async fn execute<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> CanvasResult<RawResponse> {
        self.dispatch(method, path, body, true).await
    }

    // Internal methods

    pub(crate) fn scope(&self) -> &CallScope {
        &self.scope
    }

    async fn dispatch<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        use_cache: bool,
    ) -> CanvasResult<RawResponse> {
        let url = self.resolve_target(path)?;

        let body_bytes = body
            .map(serde_json::to_vec)
            .transpose()
            .map_err(|e| {
                CanvasError::serialization(format!("Failed to serialize request body: {}", e))
                    .with_path(url.path())
            })?
            .map(Bytes::from);

        let cache = if use_cache {
            self.cache_for(&method, &url)
        } else {
            None
        };

        if let Some((cache, key)) = &cache {
            if let Some(hit) = cache.get(key) {
                self.inner.metrics.record_cache_hit();
                TracingHooks::on_cache_hit(url.as_str());
                return Ok(RawResponse::from_cache(hit, url.path()));
            }
            self.inner.metrics.record_cache_miss();
            TracingHooks::on_cache_miss(url.as_str());
        }

        let timer = RequestTimer::new(self.inner.metrics.clone());
        let result = self.send(&method, &url, body_bytes).await;
        let response = match result {
            Ok(response) => {
                timer.success();
                response
            }
            Err(e) => {
                timer.failure();
                return Err(e);
            }
        };

        self.launch_probe();

        if let Some((cache, key)) = cache {
            if response.is_json() {
                let value =
                    CachedResponse::new(response.body().clone(), response.links().next.clone());
                cache.set(key, value, self.inner.config.cache_ttl);
            }
        }

        Ok(response)
    }

    /// Cache handle and key for a cache-eligible request.
    fn cache_for(&self, method: &Method, url: &Url) -> Option<(Arc<ResponseCache>, CacheKey)> {
        if *method != Method::GET || !self.cache_enabled() {
            return None;
        }
        let cache = self.inner.cache.clone()?;
        Some((cache, CacheKey::new(url.as_str(), self.inner.config.as_user_id)))
    }

    /// Sends a request under the backoff policy, taking a governor slot
    /// for every attempt.
    async fn send(
        &self,
        method: &Method,
        url: &Url,
        body: Option<Bytes>,
    ) -> CanvasResult<RawResponse> {
        self.inner
            .backoff
            .run_with_retry(&self.scope, |attempt| {
                let body = body.clone();
                async move {
                    if attempt > 0 {
                        self.inner.metrics.record_retry();
                    }
                    self.send_once(method, url, body, attempt).await
                }
            })
            .await
    }

    async fn send_once(
        &self,
        method: &Method,
        url: &Url,
        body: Option<Bytes>,
        attempt: u32,
    ) -> CanvasResult<RawResponse> {
        let waited = self.inner.governor.wait(&self.scope).await?;
        if !waited.is_zero() {
            self.inner.metrics.record_throttled();
        }

        let mut request = self
            .inner
            .http
            .request(method.clone(), url.clone())
            .header(AUTHORIZATION, self.inner.config.token.header_value())
            .header(USER_AGENT, &self.inner.config.user_agent)
            .header(ACCEPT, "application/json");

        if let Some(bytes) = body {
            request = request.header(CONTENT_TYPE, "application/json").body(bytes);
        }

        let request = request
            .build()
            .map_err(|e| CanvasError::from_transport(e).with_path(url.path()))?;
        TracingHooks::on_request_start(method.as_str(), url.as_str(), attempt, request.headers());

        let started = Instant::now();
        let result = self.exchange(request, url).await;

        match &result {
            Ok(response) => TracingHooks::on_request_complete(
                method.as_str(),
                url.as_str(),
                response.status().as_u16(),
                started.elapsed(),
            ),
            Err(e) => TracingHooks::on_request_error(method.as_str(), url.as_str(), e),
        }

        result
    }

    async fn exchange(&self, request: reqwest::Request, url: &Url) -> CanvasResult<RawResponse> {
        let response = self
            .inner
            .http
            .execute(request)
            .await
            .map_err(|e| CanvasError::from_transport(e).with_path(url.path()))?;

        let status = response.status();
        let headers = response.headers().clone();
        self.observe_quota(&headers);

        let body = response
            .bytes()
            .await
            .map_err(|e| CanvasError::from_transport(e).with_path(url.path()))?;

        if !status.is_success() {
            return Err(error_from_response(status, &headers, &body, url.path()));
        }

        Ok(RawResponse::new(status, headers, body, url))
    }

    /// Feeds the quota headers of any exchange into the governor.
    fn observe_quota(&self, headers: &HeaderMap) {
        let Some(remaining) = header_f64(headers, RATE_LIMIT_REMAINING_HEADER) else {
            return;
        };
        let total = header_f64(headers, RATE_LIMIT_TOTAL_HEADER).unwrap_or_else(|| self.quota_total());

        if let Some(tier) = self.inner.governor.adjust(remaining, total) {
            TracingHooks::on_tier_change(tier, remaining, total);
        }
    }

    /// Starts capability discovery once per client, in the background.
    fn launch_probe(&self) {
        if !self.inner.probe.try_start() {
            return;
        }

        TracingHooks::on_capabilities_probe_started(&self.inner.config.probe_path);
        let probe_client = Self {
            inner: self.inner.clone(),
            scope: CallScope::new().timeout(self.inner.config.timeout),
        };
        tokio::spawn(async move {
            probe_client.run_probe().await;
        });
    }

    async fn run_probe(&self) {
        let result = match self.resolve_target(&self.inner.config.probe_path) {
            Ok(url) => self.send(&Method::GET, &url, None).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(response) => {
                let descriptor = CapabilityDescriptor::from_headers(response.headers());
                TracingHooks::on_capabilities_published(
                    descriptor.version(),
                    descriptor.features().len(),
                );
                self.inner.probe.publish(descriptor);
            }
            Err(e) => TracingHooks::on_capabilities_failed(&e),
        }
    }

    /// Turns a path or absolute URL into a request URL on the base origin,
    /// carrying the act-as identity.
    fn resolve_target(&self, target: &str) -> CanvasResult<Url> {
        let target = target.trim();
        let mut url = if target.starts_with("http://") || target.starts_with("https://") {
            let url = Url::parse(target).map_err(|e| {
                CanvasError::new(
                    CanvasErrorKind::UnexpectedFormat,
                    format!("Invalid URL {}: {}", target, e),
                )
            })?;
            if url.origin() != self.inner.base_url.origin() {
                return Err(CanvasError::new(
                    CanvasErrorKind::UnexpectedFormat,
                    format!("Refusing to send credentials to foreign origin: {}", target),
                )
                .with_path(url.path()));
            }
            url
        } else {
            self.build_url(target)?
        };

        if let Some(id) = self.inner.config.as_user_id {
            let present = url.query_pairs().any(|(k, _)| k == AS_USER_PARAM);
            if !present {
                url.query_pairs_mut().append_pair(AS_USER_PARAM, &id.to_string());
            }
        }

        Ok(url)
    }

    fn build_url(&self, path: &str) -> CanvasResult<Url> {
        let base = self.inner.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Url::parse(&format!("{}/{}", base, path)).map_err(|e| {
            CanvasError::configuration(format!("Invalid request path {}: {}", path, e))
        })
    }
}

impl std::fmt::Debug for CanvasClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CanvasClient")
            .field("base_url", &self.inner.base_url.as_str())
            .field("governor", &self.inner.governor)
            .field("cache_enabled", &self.cache_enabled())
            .finish()
    }
}

fn header_f64(headers: &HeaderMap, name: &str) -> Option<f64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

fn with_query<P: Serialize>(path: &str, params: &P) -> CanvasResult<String> {
    let query = serde_urlencoded::to_string(params).map_err(|e| {
        CanvasError::serialization(format!("Failed to serialize parameters: {}", e))
    })?;

    Ok(if query.is_empty() {
        path.to_string()
    } else if path.contains('?') {
        format!("{}&{}", path, query)
    } else {
        format!("{}?{}", path, query)
    })
}

/// Builder for CanvasClient.
pub struct CanvasClientBuilder {
    config_builder: CanvasConfigBuilder,
}

impl CanvasClientBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self {
            config_builder: CanvasConfig::builder(),
        }
    }

    /// Sets the base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config_builder = self.config_builder.base_url(url);
        self
    }

    /// Sets the bearer token.
    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        self.config_builder = self.config_builder.access_token(token);
        self
    }

    /// Sets the normal-tier request rate.
    pub fn requests_per_second(mut self, rps: f64) -> Self {
        self.config_builder = self.config_builder.requests_per_second(rps);
        self
    }

    /// Acts on behalf of another user.
    pub fn as_user_id(mut self, id: u64) -> Self {
        self.config_builder = self.config_builder.as_user_id(id);
        self
    }

    /// Attaches a response cache.
    pub fn cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.config_builder = self.config_builder.cache(cache);
        self
    }

    /// Sets the cache entry lifetime.
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.config_builder = self.config_builder.cache_ttl(ttl);
        self
    }

    /// Sets the User-Agent.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.config_builder = self.config_builder.user_agent(ua);
        self
    }

    /// Overrides the default quota total.
    pub fn quota_total(mut self, total: f64) -> Self {
        self.config_builder = self.config_builder.quota_total(total);
        self
    }

    /// Sets the retry configuration.
    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.config_builder = self.config_builder.retry(config);
        self
    }

    /// Disables retries.
    pub fn no_retry(mut self) -> Self {
        self.config_builder = self.config_builder.no_retry();
        self
    }

    /// Sets the timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config_builder = self.config_builder.timeout(timeout);
        self
    }

    /// Sets the capability discovery path.
    pub fn probe_path(mut self, path: impl Into<String>) -> Self {
        self.config_builder = self.config_builder.probe_path(path);
        self
    }

    /// Builds the client.
    pub fn build(self) -> CanvasResult<CanvasClient> {
        let config = self.config_builder.build()?;
        CanvasClient::new(config)
    }
}

impl Default for CanvasClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
