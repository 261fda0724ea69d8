mod fetch;
mod pages;
mod resolve;

use std::time::{Duration, Instant};

use bawiki_core::{CacheStats, CachedFetcher, FetchConfig, FetchRequest, ProxyRoute};
use serde::Serialize;
use serde_json::Value;

use crate::cli::{Cli, Command, RequestArgs};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct CommandResult {
    pub data: Value,
    pub meta: CommandMeta,
}

#[derive(Debug, Default, Serialize)]
pub struct CommandMeta {
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheStats>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl CommandResult {
    pub fn ok(data: Value) -> Self {
        Self {
            data,
            meta: CommandMeta::default(),
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.meta.warnings.push(warning.into());
        self
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.meta.latency_ms = latency_ms;
        self
    }

    pub fn with_cache_stats(mut self, stats: CacheStats) -> Self {
        self.meta.cache = Some(stats);
        self
    }
}

pub async fn run(cli: &Cli) -> Result<CommandResult, CliError> {
    let config = fetch_config(cli)?;
    let fetcher = CachedFetcher::new(config);
    let route = ProxyRoute::from(cli.route);
    let started = Instant::now();

    let result = match &cli.command {
        Command::Fetch(args) => fetch::run(args, &fetcher, route).await?,
        Command::Pages(args) => pages::run(args, &fetcher, route).await?,
        Command::Resolve(args) => resolve::run(args, &fetcher, route).await?,
    };

    let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    let stats = fetcher.stats();
    fetcher.shutdown();

    Ok(result.with_latency(latency_ms).with_cache_stats(stats))
}

/// Environment defaults with command-line overrides on top.
fn fetch_config(cli: &Cli) -> Result<FetchConfig, CliError> {
    let mut config = FetchConfig::from_env()?;
    if let Some(retries) = cli.retries {
        config.retry_budget = retries;
    }
    if let Some(ttl_secs) = cli.ttl_secs {
        config.cache_ttl = Duration::from_secs(ttl_secs);
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        if timeout_ms == 0 {
            return Err(CliError::Command(String::from(
                "--timeout-ms must be greater than zero",
            )));
        }
        config.per_attempt_timeout = Duration::from_millis(timeout_ms);
    }
    Ok(config)
}

pub(crate) fn build_request(
    fetcher: &CachedFetcher,
    urls: &[String],
    args: &RequestArgs,
    route: ProxyRoute,
) -> FetchRequest {
    fetcher
        .routed_request(urls.iter().cloned(), route)
        .with_params(args.params.iter().cloned())
        .with_headers(args.headers.iter().cloned())
        .with_delay(Duration::from_millis(args.delay_ms))
}
