//! # bawiki Core
//!
//! Shared data-acquisition layer for the bawiki query bot.
//!
//! ## Overview
//!
//! Every bot command pulls data from a handful of public mirrors. This crate
//! provides the three pieces they all lean on:
//!
//! - **Cached multi-mirror fetch** with a retry budget on the primary mirror,
//!   one attempt per fallback mirror, TTL memoization, and coalescing of
//!   concurrent identical requests
//! - **Pagination cursors** that turn a page-fetch callback into a lazy item
//!   sequence
//! - **Alias resolution** from free-form user text to canonical entity keys
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`alias`] | Alias tables, tiered resolution, atomic registry |
//! | [`cache`] | TTL store and in-flight registry |
//! | [`config`] | Fetch defaults and `BAWIKI_*` environment overrides |
//! | [`error`] | Error types |
//! | [`fetcher`] | [`CachedFetcher`] |
//! | [`http_client`] | Transport trait and reqwest implementation |
//! | [`pagination`] | [`PaginationCursor`] and [`PagedEndpoint`] |
//! | [`request`] | Requests, decode modes, payloads |
//! | [`retry`] | Attempt ordering and backoff |
//! | [`signature`] | Order-independent cache keys |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use bawiki_core::{candidates_from_bases, CachedFetcher, FetchConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let fetcher = CachedFetcher::new(FetchConfig::from_env()?);
//!     let mirrors = ["https://mirror1.example", "https://mirror2.example"];
//!
//!     let request = fetcher.request(candidates_from_bases(&mirrors, "data/stu_alias.json"));
//!     let table = fetcher.fetch(request).await?;
//!
//!     println!("{:?}", table.as_json());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────────┐
//! │ PaginationCursor │     │  AliasRegistry   │
//! └────────┬─────────┘     └────────┬─────────┘
//!          │                        │ refresh
//!          ▼                        ▼
//! ┌─────────────────────────────────────────┐
//! │              CachedFetcher              │
//! │  cache hit │ join in-flight │ lead chain │
//! └────────────────────┬────────────────────┘
//!                      │ AttemptPlan
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │      HttpClient (reqwest / scripted)     │
//! └─────────────────────────────────────────┘
//! ```

pub mod alias;
pub mod cache;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod http_client;
pub mod pagination;
pub mod request;
pub mod retry;
pub mod signature;

pub use alias::{
    normalize, resolve, resolve_known, AliasEntry, AliasRegistry, AliasTable, Resolution, Tier,
};
pub use cache::{CacheEntry, CacheStats, CacheStore, FetchCache};
pub use config::{FetchConfig, ProxyConfig, ProxyRoute};
pub use error::{AliasError, ConfigError, FetchError};
pub use fetcher::CachedFetcher;
pub use http_client::{
    HttpClient, HttpError, HttpErrorKind, HttpMethod, HttpRequest, HttpResponse,
    ReqwestHttpClient,
};
pub use pagination::{
    paginate, Page, PageFuture, PageOptions, PagedEndpoint, PaginationCursor, PaginationState,
};
pub use request::{
    candidates_from_bases, path_segment, DecodeAs, FetchOptions, FetchRequest, Payload,
    ResponseMeta,
};
pub use retry::{Attempt, AttemptPlan, Backoff};
pub use signature::RequestSignature;
