//! Fetch defaults and environment overrides.
//!
//! # Environment Variables
//!
//! | Variable | Meaning | Default |
//! |----------|---------|---------|
//! | `BAWIKI_REQ_RETRY` | extra attempts on the primary candidate | `1` |
//! | `BAWIKI_REQ_CACHE_TTL` | cache time-to-live in seconds | `10800` |
//! | `BAWIKI_REQ_TIMEOUT` | per-attempt timeout in seconds | `10` |
//! | `BAWIKI_CN_PROXY` | proxy for domestic sources | none |
//! | `BAWIKI_OVERSEA_PROXY` | proxy for overseas sources | none |
//! | `BAWIKI_USER_AGENT` | user agent for outbound requests | `bawiki/<version>` |

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::http_client::DEFAULT_USER_AGENT;
use crate::retry::Backoff;

/// Which proxy a logical request should be routed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyRoute {
    #[default]
    Direct,
    Domestic,
    Oversea,
}

/// Proxy endpoints keyed by route. Empty strings mean "no proxy".
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub domestic: Option<String>,
    pub oversea: Option<String>,
}

impl ProxyConfig {
    pub fn url_for(&self, route: ProxyRoute) -> Option<String> {
        let proxy = match route {
            ProxyRoute::Direct => None,
            ProxyRoute::Domestic => self.domestic.as_deref(),
            ProxyRoute::Oversea => self.oversea.as_deref(),
        };
        proxy
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }
}

/// Process-wide defaults applied to requests built via [`crate::CachedFetcher::request`].
#[derive(Debug, Clone, PartialEq)]
pub struct FetchConfig {
    pub retry_budget: u32,
    pub cache_ttl: Duration,
    pub per_attempt_timeout: Duration,
    pub backoff: Backoff,
    pub proxies: ProxyConfig,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            retry_budget: 1,
            cache_ttl: Duration::from_secs(3 * 60 * 60),
            per_attempt_timeout: Duration::from_secs(10),
            backoff: Backoff::None,
            proxies: ProxyConfig::default(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl FetchConfig {
    /// Defaults overridden by `BAWIKI_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`Self::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup("BAWIKI_REQ_RETRY") {
            config.retry_budget = parse_var("BAWIKI_REQ_RETRY", &value)?;
        }
        if let Some(value) = lookup("BAWIKI_REQ_CACHE_TTL") {
            config.cache_ttl = Duration::from_secs(parse_var("BAWIKI_REQ_CACHE_TTL", &value)?);
        }
        if let Some(value) = lookup("BAWIKI_REQ_TIMEOUT") {
            let seconds: f64 = parse_var("BAWIKI_REQ_TIMEOUT", &value)?;
            if !seconds.is_finite() || seconds <= 0.0 {
                return Err(ConfigError::InvalidValue {
                    name: String::from("BAWIKI_REQ_TIMEOUT"),
                    value,
                    reason: String::from("must be a positive number of seconds"),
                });
            }
            config.per_attempt_timeout = Duration::from_secs_f64(seconds);
        }
        if let Some(value) = lookup("BAWIKI_CN_PROXY") {
            config.proxies.domestic = Some(value);
        }
        if let Some(value) = lookup("BAWIKI_OVERSEA_PROXY") {
            config.proxies.oversea = Some(value);
        }
        if let Some(value) = lookup("BAWIKI_USER_AGENT").filter(|v| !v.trim().is_empty()) {
            config.user_agent = value;
        }

        Ok(config)
    }
}

fn parse_var<T>(name: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue {
            name: name.to_string(),
            value: value.to_string(),
            reason: e.to_string(),
        })
}
