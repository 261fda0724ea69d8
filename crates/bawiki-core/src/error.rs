use thiserror::Error;

use crate::http_client::HttpError;

/// Errors produced by [`crate::CachedFetcher`] and the pagination layer.
///
/// `Transport`, `Status` and `Decode` describe a single failed attempt. They
/// are retried and logged internally; callers only ever see them wrapped in
/// `AllCandidatesExhausted`. The type is `Clone` because every caller
/// coalesced onto one in-flight request receives the same error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("invalid fetch request: {reason}")]
    InvalidRequest { reason: String },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: HttpError,
    },

    #[error("request to {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("response from {url} could not be decoded: {message}")]
    Decode { url: String, message: String },

    #[error("all candidates exhausted after {attempts} attempts, last error: {last}")]
    AllCandidatesExhausted {
        attempts: u32,
        #[source]
        last: Box<FetchError>,
    },

    #[error("in-flight request aborted: {reason}")]
    Aborted { reason: String },

    #[error("fetch cache has been shut down")]
    Shutdown,
}

impl FetchError {
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    pub fn decode(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            url: url.into(),
            message: message.into(),
        }
    }

    /// True for errors describing one failed attempt against one candidate.
    pub const fn is_attempt_failure(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::Status { .. } | Self::Decode { .. }
        )
    }

    /// The most recent single-attempt error, unwrapping exhaustion.
    pub fn last_attempt_error(&self) -> &FetchError {
        match self {
            Self::AllCandidatesExhausted { last, .. } => last.last_attempt_error(),
            other => other,
        }
    }

    /// HTTP status of the last attempt, when it got that far.
    pub fn status(&self) -> Option<u16> {
        match self.last_attempt_error() {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Invalid environment configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("environment variable {name} has invalid value '{value}': {reason}")]
    InvalidValue {
        name: String,
        value: String,
        reason: String,
    },
}

/// Alias table loading failures.
#[derive(Debug, Error)]
pub enum AliasError {
    #[error("failed to read alias table {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("alias table is not valid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("alias table entry '{key}' must be a string or an array of strings")]
    InvalidEntry { key: String },

    #[error("alias table must be a json object, got {found}")]
    NotAnObject { found: &'static str },

    #[error(transparent)]
    Fetch(#[from] FetchError),
}
