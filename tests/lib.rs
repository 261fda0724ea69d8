//! Shared fixtures for behavior tests: a scripted in-memory transport.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub use bawiki_core::{
    CachedFetcher, FetchConfig, HttpClient, HttpError, HttpRequest, HttpResponse,
};

/// One scripted reaction to an attempt.
#[derive(Debug, Clone)]
pub enum Step {
    /// 200 with a JSON body.
    Json(String),
    /// Response with an arbitrary status and empty body.
    Status(u16),
    /// Connection refused.
    Fail,
    /// Never answers; only a timeout ends the attempt.
    Hang,
}

impl Step {
    pub fn json(body: impl Into<String>) -> Self {
        Self::Json(body.into())
    }
}

type Handler = dyn Fn(&HttpRequest) -> Step + Send + Sync;

/// Transport that plays back per-URL scripts and records every attempt.
///
/// Each URL consumes its script front to back; the final step repeats
/// forever. URLs without a script fall through to the handler, or fail.
#[derive(Default)]
pub struct ScriptedHttpClient {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    handler: Option<Box<Handler>>,
    latency: Duration,
    log: Mutex<Vec<HttpRequest>>,
}

impl ScriptedHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn script(self, url: &str, steps: impl IntoIterator<Item = Step>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(url.to_string(), steps.into_iter().collect());
        self
    }

    pub fn respond_with<F>(mut self, handler: F) -> Self
    where
        F: Fn(&HttpRequest) -> Step + Send + Sync + 'static,
    {
        self.handler = Some(Box::new(handler));
        self
    }

    /// URLs in attempt order.
    pub fn attempts(&self) -> Vec<String> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .map(|request| request.url.clone())
            .collect()
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.log.lock().unwrap().clone()
    }

    pub fn attempt_count(&self) -> usize {
        self.log.lock().unwrap().len()
    }

    fn next_step(&self, request: &HttpRequest) -> Step {
        let mut scripts = self.scripts.lock().unwrap();
        if let Some(script) = scripts.get_mut(&request.url) {
            if script.len() > 1 {
                if let Some(step) = script.pop_front() {
                    return step;
                }
            }
            if let Some(step) = script.front() {
                return step.clone();
            }
        }
        drop(scripts);

        match &self.handler {
            Some(handler) => handler(request),
            None => Step::Fail,
        }
    }
}

impl HttpClient for ScriptedHttpClient {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        Box::pin(async move {
            self.log.lock().unwrap().push(request.clone());
            let step = self.next_step(&request);
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            match step {
                Step::Json(body) => Ok(HttpResponse::ok_json(body).with_url(request.url)),
                Step::Status(status) => Ok(HttpResponse::new(status, Vec::new())),
                Step::Fail => Err(HttpError::connect(format!("{} refused", request.url))),
                Step::Hang => std::future::pending().await,
            }
        })
    }
}

/// A fetcher over `client` with default configuration and a fresh cache.
pub fn fetcher_over(client: ScriptedHttpClient) -> (CachedFetcher, Arc<ScriptedHttpClient>) {
    let client = Arc::new(client);
    let fetcher = CachedFetcher::with_client(client.clone(), FetchConfig::default());
    (fetcher, client)
}
