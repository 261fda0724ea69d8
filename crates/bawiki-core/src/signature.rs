//! Canonical cache key for a fetch request.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};

use crate::http_client::HttpMethod;
use crate::request::{DecodeAs, FetchRequest};

/// Order-independent identity of a [`FetchRequest`].
///
/// Map-valued fields are held as sorted maps, so two requests built with the
/// same pairs in a different order compare and hash equal. Retry budget, TTL,
/// timeout, proxy and delay describe *how* to fetch, not *what*, and are left
/// out.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestSignature {
    candidates: Vec<String>,
    method: HttpMethod,
    params: BTreeMap<String, String>,
    headers: BTreeMap<String, String>,
    body: Option<Vec<u8>>,
    decode_as: DecodeAs,
}

impl RequestSignature {
    pub fn new(request: &FetchRequest) -> Self {
        let options = &request.options;
        Self {
            candidates: request.candidates.clone(),
            method: options.method,
            params: options.params.clone(),
            headers: options
                .headers
                .iter()
                .map(|(name, value)| (name.to_ascii_lowercase(), value.clone()))
                .collect(),
            body: options.body.clone(),
            decode_as: options.decode_as,
        }
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    pub const fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    pub const fn decode_as(&self) -> DecodeAs {
        self.decode_as
    }

    /// Stable 64-bit digest, used to correlate log lines for one signature.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

impl Display for RequestSignature {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let primary = self.candidates.first().map(String::as_str).unwrap_or("");
        write!(f, "{} {}", self.method, primary)?;

        let mut separator = '?';
        for (name, value) in &self.params {
            write!(
                f,
                "{separator}{}={}",
                urlencoding::encode(name),
                urlencoding::encode(value)
            )?;
            separator = '&';
        }

        if self.candidates.len() > 1 {
            write!(f, " (+{} mirrors)", self.candidates.len() - 1)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::*;

    #[test]
    fn map_insertion_order_does_not_change_signature() {
        let mut forward = HashMap::new();
        forward.insert("page", "1");
        forward.insert("size", "100");
        forward.insert("server", "2");

        let reversed: Vec<(&str, &str)> = vec![("server", "2"), ("size", "100"), ("page", "1")];

        let a = FetchRequest::get("https://api.test/rank").with_params(forward);
        let b = FetchRequest::get("https://api.test/rank").with_params(reversed);

        assert_eq!(a.signature(), b.signature());
        assert_eq!(a.signature().fingerprint(), b.signature().fingerprint());
    }

    #[test]
    fn execution_knobs_are_not_part_of_identity() {
        let a = FetchRequest::get("https://api.test/x");
        let b = FetchRequest::get("https://api.test/x")
            .with_retry_budget(5)
            .with_ttl(Duration::from_secs(1))
            .with_timeout(Duration::from_millis(50))
            .with_proxy(Some(String::from("http://proxy.test:8080")));

        assert_eq!(a.signature(), b.signature());
    }

    #[test]
    fn candidate_order_and_decode_mode_are_part_of_identity() {
        let a = FetchRequest::new(["https://m1.test/x", "https://m2.test/x"]);
        let b = FetchRequest::new(["https://m2.test/x", "https://m1.test/x"]);
        let c = a.clone().decode_as(DecodeAs::Text);

        assert_ne!(a.signature(), b.signature());
        assert_ne!(a.signature(), c.signature());
    }

    #[test]
    fn display_shows_sorted_encoded_query() {
        let request = FetchRequest::new(["https://api.test/rank", "https://backup.test/rank"])
            .with_param("size", "100")
            .with_param("name", "白子");

        assert_eq!(
            request.signature().to_string(),
            "GET https://api.test/rank?name=%E7%99%BD%E5%AD%90&size=100 (+1 mirrors)"
        );
    }
}
