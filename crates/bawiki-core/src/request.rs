//! Fetch request description, decode modes and decoded payloads.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::FetchConfig;
use crate::error::FetchError;
use crate::http_client::{HttpMethod, HttpResponse};
use crate::retry::{AttemptPlan, Backoff};
use crate::signature::RequestSignature;

/// How a successful response body is turned into a [`Payload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeAs {
    #[default]
    Json,
    Text,
    Bytes,
    Metadata,
}

impl DecodeAs {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Text => "text",
            Self::Bytes => "bytes",
            Self::Metadata => "metadata",
        }
    }
}

/// Every recognized per-request knob.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOptions {
    pub method: HttpMethod,
    /// Query parameters. Sorted by key, so insertion order never matters.
    pub params: BTreeMap<String, String>,
    /// Header names are stored lower-cased.
    pub headers: BTreeMap<String, String>,
    pub body: Option<Vec<u8>>,
    pub decode_as: DecodeAs,
    /// Extra attempts granted to the first candidate only.
    pub retry_budget: u32,
    pub backoff: Backoff,
    /// Zero disables caching for this request.
    pub ttl: Duration,
    pub per_attempt_timeout: Duration,
    /// One proxy for the whole logical request.
    pub proxy: Option<String>,
    /// Wait before the attempt chain starts. Never applied on cache hits.
    pub delay: Duration,
    /// Treat non-2xx statuses as attempt failures.
    pub raise_for_status: bool,
}

impl FetchOptions {
    pub fn from_config(config: &FetchConfig) -> Self {
        Self {
            method: HttpMethod::Get,
            params: BTreeMap::new(),
            headers: BTreeMap::new(),
            body: None,
            decode_as: DecodeAs::Json,
            retry_budget: config.retry_budget,
            backoff: config.backoff,
            ttl: config.cache_ttl,
            per_attempt_timeout: config.per_attempt_timeout,
            proxy: None,
            delay: Duration::ZERO,
            raise_for_status: true,
        }
    }
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self::from_config(&FetchConfig::default())
    }
}

/// A logical request: ordered candidate URLs plus options.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub candidates: Vec<String>,
    pub options: FetchOptions,
}

impl FetchRequest {
    pub fn new<I, S>(candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            candidates: candidates.into_iter().map(Into::into).collect(),
            options: FetchOptions::default(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new([url.into()])
    }

    pub fn with_options(mut self, options: FetchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.options.method = method;
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.params.insert(name.into(), value.into());
        self
    }

    pub fn with_params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.options
            .params
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.options
            .headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.options.headers.extend(
            headers
                .into_iter()
                .map(|(k, v)| (k.into().to_ascii_lowercase(), v.into())),
        );
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.options.body = Some(body.into());
        self
    }

    /// Serialize `value` as the JSON body and set the content type.
    pub fn with_json_body<T: Serialize>(self, value: &T) -> Result<Self, FetchError> {
        let body = serde_json::to_vec(value)
            .map_err(|e| FetchError::invalid_request(format!("unserializable body: {e}")))?;
        Ok(self
            .with_header("content-type", "application/json")
            .with_body(body))
    }

    pub fn decode_as(mut self, decode_as: DecodeAs) -> Self {
        self.options.decode_as = decode_as;
        self
    }

    pub fn with_retry_budget(mut self, retry_budget: u32) -> Self {
        self.options.retry_budget = retry_budget;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.options.backoff = backoff;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.options.ttl = ttl;
        self
    }

    pub fn with_timeout(mut self, per_attempt_timeout: Duration) -> Self {
        self.options.per_attempt_timeout = per_attempt_timeout;
        self
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.options.proxy = proxy;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.options.delay = delay;
        self
    }

    pub fn without_status_check(mut self) -> Self {
        self.options.raise_for_status = false;
        self
    }

    pub fn primary_url(&self) -> Option<&str> {
        self.candidates.first().map(String::as_str)
    }

    pub fn signature(&self) -> RequestSignature {
        RequestSignature::new(self)
    }

    pub fn attempt_plan(&self) -> AttemptPlan {
        AttemptPlan::new(self.candidates.len(), self.options.retry_budget)
    }

    /// Upper bound on a cold fetch, excluding backoff.
    pub fn worst_case_latency(&self) -> Duration {
        self.attempt_plan()
            .worst_case_latency(self.options.per_attempt_timeout)
            .saturating_add(self.options.delay)
    }
}

/// Join one relative path onto several mirror base URLs, in mirror order.
///
/// An absolute `path` (`http://` or `https://`) is returned unchanged as the
/// only candidate.
pub fn candidates_from_bases<S: AsRef<str>>(bases: &[S], path: &str) -> Vec<String> {
    if is_absolute(path) {
        return vec![path.to_string()];
    }

    let path = path.trim_start_matches('/');
    bases
        .iter()
        .map(|base| {
            let base = base.as_ref().trim_end_matches('/');
            if path.is_empty() {
                base.to_string()
            } else {
                format!("{base}/{path}")
            }
        })
        .collect()
}

/// Percent-encode a single path segment, e.g. a student name.
pub fn path_segment(segment: &str) -> String {
    urlencoding::encode(segment).into_owned()
}

fn is_absolute(path: &str) -> bool {
    let lower = path.get(..8).unwrap_or(path).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Response metadata returned for [`DecodeAs::Metadata`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMeta {
    pub status: u16,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub content_length: usize,
}

/// A decoded, cacheable response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Text(String),
    Bytes(Vec<u8>),
    Metadata(ResponseMeta),
}

impl Payload {
    /// Decode a response per `decode_as`. `url` is the candidate that answered.
    pub fn decode(
        decode_as: DecodeAs,
        url: &str,
        response: HttpResponse,
    ) -> Result<Self, FetchError> {
        match decode_as {
            DecodeAs::Json => serde_json::from_slice(&response.body)
                .map(Self::Json)
                .map_err(|e| FetchError::decode(url, e.to_string())),
            DecodeAs::Text => Ok(Self::Text(
                String::from_utf8_lossy(&response.body).into_owned(),
            )),
            DecodeAs::Bytes => Ok(Self::Bytes(response.body)),
            DecodeAs::Metadata => {
                let final_url = if response.url.is_empty() {
                    url.to_string()
                } else {
                    response.url
                };
                Ok(Self::Metadata(ResponseMeta {
                    status: response.status,
                    url: final_url,
                    headers: response.headers,
                    content_length: response.body.len(),
                }))
            }
        }
    }

    pub const fn kind(&self) -> DecodeAs {
        match self {
            Self::Json(_) => DecodeAs::Json,
            Self::Text(_) => DecodeAs::Text,
            Self::Bytes(_) => DecodeAs::Bytes,
            Self::Metadata(_) => DecodeAs::Metadata,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_json(self) -> Option<Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            Self::Text(text) => Some(text.as_bytes()),
            _ => None,
        }
    }

    pub fn metadata(&self) -> Option<&ResponseMeta> {
        match self {
            Self::Metadata(meta) => Some(meta),
            _ => None,
        }
    }

    /// Deserialize a JSON payload into `T`.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, FetchError> {
        let value = self.as_json().ok_or_else(|| {
            FetchError::decode("", format!("expected json payload, got {}", self.kind().as_str()))
        })?;
        T::deserialize(value).map_err(|e| FetchError::decode("", e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bases_are_joined_in_mirror_order() {
        let candidates = candidates_from_bases(
            &["https://mirror1.test/db/", "https://mirror2.test/db"],
            "/data/stu_alias.json",
        );

        assert_eq!(
            candidates,
            vec![
                "https://mirror1.test/db/data/stu_alias.json",
                "https://mirror2.test/db/data/stu_alias.json",
            ]
        );
    }

    #[test]
    fn absolute_path_ignores_bases() {
        let candidates =
            candidates_from_bases(&["https://mirror1.test"], "https://cdn.test/a.png");

        assert_eq!(candidates, vec!["https://cdn.test/a.png"]);
    }

    #[test]
    fn path_segment_is_percent_encoded() {
        assert_eq!(path_segment("白子 (泳装)"), "%E7%99%BD%E5%AD%90%20%28%E6%B3%B3%E8%A3%85%29");
    }

    #[test]
    fn json_decode_failure_names_the_url() {
        let error = Payload::decode(
            DecodeAs::Json,
            "https://mirror.test/x",
            HttpResponse::ok("<html>"),
        )
        .expect_err("html is not json");

        assert!(matches!(error, FetchError::Decode { ref url, .. } if url == "https://mirror.test/x"));
    }

    #[test]
    fn metadata_decode_keeps_status_and_length() {
        let response = HttpResponse::new(200, b"abcd".to_vec()).with_header("ETag", "v1");
        let payload =
            Payload::decode(DecodeAs::Metadata, "https://mirror.test/x", response).expect("meta");
        let meta = payload.metadata().expect("metadata payload");

        assert_eq!(meta.status, 200);
        assert_eq!(meta.url, "https://mirror.test/x");
        assert_eq!(meta.content_length, 4);
        assert_eq!(meta.headers.get("etag").map(String::as_str), Some("v1"));
    }

    #[test]
    fn payload_deserializes_into_typed_value() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Season {
            season: u32,
        }

        let payload = Payload::Json(json!({ "season": 12 }));

        assert_eq!(payload.deserialize::<Season>().expect("typed"), Season { season: 12 });
        assert!(Payload::Text(String::from("x")).deserialize::<Season>().is_err());
    }

    #[test]
    fn worst_case_latency_counts_every_attempt_and_the_delay() {
        let request = FetchRequest::new(["https://a.test", "https://b.test", "https://c.test"])
            .with_retry_budget(2)
            .with_timeout(Duration::from_secs(3))
            .with_delay(Duration::from_secs(1));

        assert_eq!(request.worst_case_latency(), Duration::from_secs(16));
    }

    #[test]
    fn header_and_param_insertion_order_does_not_matter() {
        let a = FetchRequest::get("https://a.test")
            .with_param("page", "1")
            .with_param("size", "100")
            .with_header("Referer", "https://a.test");
        let b = FetchRequest::get("https://a.test")
            .with_header("referer", "https://a.test")
            .with_params([("size", "100"), ("page", "1")]);

        assert_eq!(a.options.params, b.options.params);
        assert_eq!(a.options.headers, b.options.headers);
    }
}
