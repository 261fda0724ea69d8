//! Cached, coalescing, multi-candidate fetch.
//!
//! A call resolves in one of three ways:
//!
//! | Path | Network | Notes |
//! |------|---------|-------|
//! | cache hit | none | valid entry for the signature |
//! | coalesced | none of its own | awaits the chain already running for the signature |
//! | leader | one attempt chain | runs in a spawned task, publishes to every waiter |
//!
//! The attempt chain is owned by a spawned task rather than by the first
//! caller, so a caller that stops waiting never cancels work other callers
//! are attached to.

use std::sync::Arc;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use tokio::time::Instant;

use crate::cache::{CacheStats, FetchCache, InFlightSlot, SharedFetch};
use crate::config::{FetchConfig, ProxyRoute};
use crate::error::FetchError;
use crate::http_client::{HttpClient, HttpError, HttpRequest, ReqwestHttpClient};
use crate::request::{DecodeAs, FetchOptions, FetchRequest, Payload};
use crate::signature::RequestSignature;

struct FetcherInner {
    client: Arc<dyn HttpClient>,
    cache: FetchCache,
    config: FetchConfig,
}

/// Cheaply cloneable handle to one cache and one transport.
#[derive(Clone)]
pub struct CachedFetcher {
    inner: Arc<FetcherInner>,
}

impl std::fmt::Debug for CachedFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedFetcher")
            .field("config", &self.inner.config)
            .field("cache", &self.inner.cache)
            .finish()
    }
}

impl Default for CachedFetcher {
    fn default() -> Self {
        Self::new(FetchConfig::default())
    }
}

impl CachedFetcher {
    /// Fetcher backed by reqwest.
    pub fn new(config: FetchConfig) -> Self {
        let client = ReqwestHttpClient::with_user_agent(config.user_agent.clone());
        Self::with_client(Arc::new(client), config)
    }

    /// Fetcher over an arbitrary transport, with its own empty cache.
    pub fn with_client(client: Arc<dyn HttpClient>, config: FetchConfig) -> Self {
        tracing::debug!(
            retry_budget = config.retry_budget,
            cache_ttl_ms = config.cache_ttl.as_millis() as u64,
            per_attempt_timeout_ms = config.per_attempt_timeout.as_millis() as u64,
            "creating cached fetcher"
        );
        Self {
            inner: Arc::new(FetcherInner {
                client,
                cache: FetchCache::new(),
                config,
            }),
        }
    }

    pub fn config(&self) -> &FetchConfig {
        &self.inner.config
    }

    /// A request pre-filled with this fetcher's defaults.
    pub fn request<I, S>(&self, candidates: I) -> FetchRequest
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FetchRequest::new(candidates).with_options(FetchOptions::from_config(&self.inner.config))
    }

    /// Same as [`Self::request`] with the proxy picked by route.
    pub fn routed_request<I, S>(&self, candidates: I, route: ProxyRoute) -> FetchRequest
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let proxy = self.inner.config.proxies.url_for(route);
        self.request(candidates).with_proxy(proxy)
    }

    /// Fetch and decode, consulting the cache and any in-flight twin first.
    pub async fn fetch(&self, request: FetchRequest) -> Result<Payload, FetchError> {
        if request.candidates.is_empty() {
            return Err(FetchError::invalid_request(
                "at least one candidate url is required",
            ));
        }

        let signature = request.signature();
        let shared = match self.lookup_or_start(signature, request) {
            Lookup::Hit(payload) => return Ok(payload),
            Lookup::Wait(shared) => shared,
            Lookup::Closed => return Err(FetchError::Shutdown),
        };
        shared.await
    }

    /// Fetch JSON and deserialize it into `T`.
    pub async fn fetch_json<T: DeserializeOwned>(
        &self,
        request: FetchRequest,
    ) -> Result<T, FetchError> {
        let url = request.primary_url().unwrap_or_default().to_string();
        let payload = self.fetch(request.decode_as(DecodeAs::Json)).await?;
        payload.deserialize().map_err(|error| match error {
            FetchError::Decode { message, .. } => FetchError::decode(url, message),
            other => other,
        })
    }

    /// Drop every cache entry; returns how many were dropped.
    pub fn clear(&self) -> usize {
        self.inner.cache.clear()
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    pub fn purge_expired(&self) -> usize {
        self.inner.cache.purge_expired()
    }

    /// Abort in-flight chains, clear the cache, and fail later fetches with
    /// [`FetchError::Shutdown`].
    pub fn shutdown(&self) {
        self.inner.cache.shutdown();
    }

    fn lookup_or_start(&self, signature: RequestSignature, request: FetchRequest) -> Lookup {
        let mut state = self.inner.cache.lock();
        if state.closed {
            return Lookup::Closed;
        }

        if let Some(payload) = state.store.get(&signature, Instant::now()) {
            state.hits += 1;
            tracing::debug!(
                signature = %signature,
                fingerprint = signature.fingerprint(),
                "cache hit"
            );
            return Lookup::Hit(payload);
        }

        if let Some(slot) = state.in_flight.get(&signature) {
            let shared = slot.shared.clone();
            state.coalesced += 1;
            tracing::debug!(
                signature = %signature,
                fingerprint = signature.fingerprint(),
                "joining in-flight request"
            );
            return Lookup::Wait(shared);
        }

        state.misses += 1;
        tracing::debug!(
            signature = %signature,
            fingerprint = signature.fingerprint(),
            "cache miss, starting attempt chain"
        );

        // The task cannot finish its bookkeeping before the slot is
        // registered: it needs this same lock.
        let task = tokio::spawn(self.clone().lead(signature.clone(), request));
        let abort = task.abort_handle();
        let shared: SharedFetch = async move {
            match task.await {
                Ok(result) => result,
                Err(join_error) if join_error.is_cancelled() => Err(FetchError::Aborted {
                    reason: String::from("fetch cache shut down"),
                }),
                Err(join_error) => Err(FetchError::Aborted {
                    reason: join_error.to_string(),
                }),
            }
        }
        .boxed()
        .shared();

        state.in_flight.insert(
            signature,
            InFlightSlot {
                shared: shared.clone(),
                abort,
            },
        );
        Lookup::Wait(shared)
    }

    /// Runs the chain, then caches and releases the slot in one critical section.
    async fn lead(
        self,
        signature: RequestSignature,
        request: FetchRequest,
    ) -> Result<Payload, FetchError> {
        let result = self.attempt_chain(&request).await;

        let mut state = self.inner.cache.lock();
        if let Ok(payload) = &result {
            if !state.closed {
                state.store.put(
                    signature.clone(),
                    payload.clone(),
                    request.options.ttl,
                    Instant::now(),
                );
            }
        }
        state.in_flight.remove(&signature);
        result
    }

    async fn attempt_chain(&self, request: &FetchRequest) -> Result<Payload, FetchError> {
        let options = &request.options;
        if !options.delay.is_zero() {
            tokio::time::sleep(options.delay).await;
        }

        let plan = request.attempt_plan();
        let total = plan.len();
        let mut attempts = plan.iter().enumerate().peekable();
        let mut last_error = None;

        while let Some((index, attempt)) = attempts.next() {
            if attempt.retry > 0 {
                let delay = options.backoff.delay(attempt.retry - 1);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }

            let url = &request.candidates[attempt.candidate];
            match self.attempt(url, options).await {
                Ok(payload) => {
                    if index > 0 {
                        tracing::info!(url = %url, attempt = index + 1, "request recovered");
                    }
                    return Ok(payload);
                }
                Err(error) => {
                    match attempts.peek() {
                        Some((_, next)) if next.candidate == attempt.candidate => {
                            tracing::warn!(
                                url = %url,
                                retries_left = total - index - 1,
                                error = %error,
                                "request failed, retrying"
                            );
                        }
                        Some((_, next)) => {
                            tracing::warn!(
                                url = %url,
                                next = %request.candidates[next.candidate],
                                error = %error,
                                "request failed, falling back to next candidate"
                            );
                        }
                        None => {
                            tracing::error!(
                                url = %url,
                                attempts = total,
                                error = %error,
                                "request failed, all candidates exhausted"
                            );
                        }
                    }
                    last_error = Some(error);
                }
            }
        }

        let last = last_error.unwrap_or_else(|| {
            FetchError::invalid_request("at least one candidate url is required")
        });
        Err(FetchError::AllCandidatesExhausted {
            attempts: u32::try_from(total).unwrap_or(u32::MAX),
            last: Box::new(last),
        })
    }

    async fn attempt(&self, url: &str, options: &FetchOptions) -> Result<Payload, FetchError> {
        let mut http_request = HttpRequest::new(options.method, url)
            .with_timeout(options.per_attempt_timeout)
            .with_proxy(options.proxy.clone());
        http_request.query = options.params.clone();
        http_request.headers = options.headers.clone();
        http_request.body = options.body.clone();

        let response = tokio::time::timeout(
            options.per_attempt_timeout,
            self.inner.client.execute(http_request),
        )
        .await
        .map_err(|_| FetchError::Transport {
            url: url.to_string(),
            source: HttpError::timeout(format!(
                "no response within {} ms",
                options.per_attempt_timeout.as_millis()
            )),
        })?
        .map_err(|source| FetchError::Transport {
            url: url.to_string(),
            source,
        })?;

        if options.raise_for_status && !response.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status,
            });
        }

        Payload::decode(options.decode_as, url, response)
    }
}

enum Lookup {
    Hit(Payload),
    Wait(SharedFetch),
    Closed,
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, VecDeque};
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;

    use std::time::Duration;

    use super::*;
    use crate::http_client::HttpResponse;

    enum Step {
        Ok(&'static str),
        Status(u16),
        Fail,
        Hang,
    }

    #[derive(Default)]
    struct MockClient {
        scripts: Mutex<HashMap<String, VecDeque<Step>>>,
        calls: Mutex<Vec<String>>,
        latency: Duration,
    }

    impl MockClient {
        fn script(self, url: &str, steps: Vec<Step>) -> Self {
            self.scripts
                .lock()
                .unwrap()
                .insert(url.to_string(), steps.into());
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl HttpClient for MockClient {
        fn execute<'a>(
            &'a self,
            request: HttpRequest,
        ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
            Box::pin(async move {
                self.calls.lock().unwrap().push(request.url.clone());
                let step = self
                    .scripts
                    .lock()
                    .unwrap()
                    .get_mut(&request.url)
                    .and_then(VecDeque::pop_front)
                    .unwrap_or(Step::Fail);
                if !self.latency.is_zero() {
                    tokio::time::sleep(self.latency).await;
                }
                match step {
                    Step::Ok(body) => Ok(HttpResponse::ok_json(body)),
                    Step::Status(status) => Ok(HttpResponse::new(status, Vec::new())),
                    Step::Fail => Err(HttpError::connect("refused")),
                    Step::Hang => std::future::pending().await,
                }
            })
        }
    }

    fn fetcher_over(client: MockClient) -> (CachedFetcher, Arc<MockClient>) {
        let client = Arc::new(client);
        let fetcher = CachedFetcher::with_client(client.clone(), FetchConfig::default());
        (fetcher, client)
    }

    #[tokio::test]
    async fn empty_candidate_list_is_rejected_without_network() {
        let (fetcher, client) = fetcher_over(MockClient::default());

        let error = fetcher
            .fetch(FetchRequest::new(Vec::<String>::new()))
            .await
            .expect_err("no candidates");

        assert!(matches!(error, FetchError::InvalidRequest { .. }));
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn retries_primary_then_falls_back_in_order() {
        let (fetcher, client) = fetcher_over(
            MockClient::default()
                .script("https://a.test", vec![Step::Fail, Step::Status(502), Step::Fail])
                .script("https://b.test", vec![Step::Ok(r#"{"ok":true}"#)])
                .script("https://c.test", vec![Step::Ok(r#"{"ok":"c"}"#)]),
        );

        let request = fetcher
            .request(["https://a.test", "https://b.test", "https://c.test"])
            .with_retry_budget(2);
        let payload = fetcher.fetch(request).await.expect("b succeeds");

        assert_eq!(payload, Payload::Json(serde_json::json!({ "ok": true })));
        assert_eq!(
            client.calls(),
            vec!["https://a.test", "https://a.test", "https://a.test", "https://b.test"]
        );
    }

    #[tokio::test]
    async fn exhaustion_wraps_last_error_and_is_not_cached() {
        let (fetcher, client) = fetcher_over(
            MockClient::default()
                .script("https://a.test", vec![Step::Fail, Step::Fail])
                .script("https://b.test", vec![Step::Status(404), Step::Ok("{}")]),
        );

        let request = fetcher
            .request(["https://a.test", "https://b.test"])
            .with_retry_budget(1);
        let error = fetcher.fetch(request.clone()).await.expect_err("all fail");

        match &error {
            FetchError::AllCandidatesExhausted { attempts, last } => {
                assert_eq!(*attempts, 3);
                assert_eq!(last.status(), Some(404));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(client.calls().len(), 3);
        assert_eq!(fetcher.stats().entries, 0);
        assert_eq!(fetcher.stats().in_flight, 0);
    }

    #[tokio::test]
    async fn status_check_can_be_disabled() {
        let (fetcher, _client) = fetcher_over(
            MockClient::default().script("https://a.test", vec![Step::Status(404)]),
        );

        let payload = fetcher
            .fetch(
                fetcher
                    .request(["https://a.test"])
                    .decode_as(DecodeAs::Metadata)
                    .without_status_check(),
            )
            .await
            .expect("404 accepted");

        assert_eq!(payload.metadata().map(|m| m.status), Some(404));
    }

    #[tokio::test]
    async fn second_call_is_served_from_cache() {
        let (fetcher, client) = fetcher_over(
            MockClient::default().script("https://a.test", vec![Step::Ok("[1,2,3]")]),
        );

        let first = fetcher.fetch(fetcher.request(["https://a.test"])).await;
        let second = fetcher.fetch(fetcher.request(["https://a.test"])).await;

        assert_eq!(first, second);
        assert_eq!(client.calls().len(), 1);
        let stats = fetcher.stats();
        assert_eq!((stats.entries, stats.hits, stats.misses), (1, 1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_attempt_is_cut_by_per_attempt_timeout() {
        let (fetcher, client) = fetcher_over(
            MockClient::default()
                .script("https://a.test", vec![Step::Hang])
                .script("https://b.test", vec![Step::Ok("\"b\"")]),
        );

        let started = Instant::now();
        let payload = fetcher
            .fetch(
                fetcher
                    .request(["https://a.test", "https://b.test"])
                    .with_retry_budget(0)
                    .with_timeout(Duration::from_secs(2)),
            )
            .await
            .expect("fallback answers");

        assert_eq!(payload, Payload::Json(serde_json::json!("b")));
        assert_eq!(client.calls().len(), 2);
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_identical_requests_share_one_chain() {
        let client = MockClient {
            latency: Duration::from_millis(200),
            ..MockClient::default()
        }
        .script("https://a.test", vec![Step::Ok("{\"n\":1}")]);
        let (fetcher, client) = fetcher_over(client);

        let calls = (0..5).map(|_| fetcher.fetch(fetcher.request(["https://a.test"])));
        let results = futures::future::join_all(calls).await;

        assert_eq!(client.calls().len(), 1);
        assert!(results.iter().all(|r| r == &results[0]));
        assert!(results[0].is_ok());
        assert_eq!(fetcher.stats().coalesced, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_waiter_does_not_cancel_shared_chain() {
        let client = MockClient {
            latency: Duration::from_millis(500),
            ..MockClient::default()
        }
        .script("https://a.test", vec![Step::Ok("1")]);
        let (fetcher, client) = fetcher_over(client);

        let abandoned = tokio::time::timeout(
            Duration::from_millis(100),
            fetcher.fetch(fetcher.request(["https://a.test"])),
        )
        .await;
        assert!(abandoned.is_err());

        let result = fetcher.fetch(fetcher.request(["https://a.test"])).await;

        assert_eq!(result, Ok(Payload::Json(serde_json::json!(1))));
        assert_eq!(client.calls().len(), 1);
    }

    #[tokio::test]
    async fn shutdown_rejects_new_fetches() {
        let (fetcher, client) = fetcher_over(MockClient::default());

        fetcher.shutdown();
        let error = fetcher
            .fetch(fetcher.request(["https://a.test"]))
            .await
            .expect_err("closed");

        assert_eq!(error, FetchError::Shutdown);
        assert!(client.calls().is_empty());
    }

}
