//! Lazy, forward-only traversal of paged remote APIs.
//!
//! A [`PaginationCursor`] owns a page-fetch callback and walks page indices
//! upward from `first_page`. It stops after a page flagged `is_last` (whose
//! items are still yielded), after an empty page, or after the first error.
//! A finished cursor stays finished; build a new one to iterate again.

use std::future::Future;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::{self, Stream, StreamExt};
use serde_json::Value;

use crate::error::FetchError;
use crate::fetcher::CachedFetcher;
use crate::request::{DecodeAs, FetchRequest};

/// One page returned by a page-fetch callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub is_last: bool,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, is_last: bool) -> Self {
        Self { items, is_last }
    }

    /// A page with more to follow.
    pub fn more(items: Vec<T>) -> Self {
        Self::new(items, false)
    }

    /// The final page.
    pub fn last(items: Vec<T>) -> Self {
        Self::new(items, true)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageOptions {
    pub first_page: u32,
    pub page_size: u32,
    /// Sleep between page fetches, never before the first.
    pub delay: Duration,
}

impl Default for PageOptions {
    fn default() -> Self {
        Self {
            first_page: 1,
            page_size: 100,
            delay: Duration::ZERO,
        }
    }
}

impl PageOptions {
    pub fn with_first_page(mut self, first_page: u32) -> Self {
        self.first_page = first_page;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Cursor position. Mutated only by [`PaginationCursor::next_page`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationState {
    pub next_page: u32,
    pub page_size: u32,
    pub exhausted: bool,
}

/// Boxed page future, handy for callbacks that capture cloned state.
pub type PageFuture<T> = BoxFuture<'static, Result<Page<T>, FetchError>>;

pub struct PaginationCursor<T, F> {
    fetch_page: F,
    state: PaginationState,
    delay: Duration,
    pages_fetched: u32,
    _items: std::marker::PhantomData<fn() -> T>,
}

impl<T, F> std::fmt::Debug for PaginationCursor<T, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaginationCursor")
            .field("state", &self.state)
            .field("delay", &self.delay)
            .field("pages_fetched", &self.pages_fetched)
            .finish()
    }
}

/// Build a cursor over `fetch_page(page_index, page_size)`.
pub fn paginate<T, F, Fut>(fetch_page: F, options: PageOptions) -> PaginationCursor<T, F>
where
    F: FnMut(u32, u32) -> Fut,
    Fut: Future<Output = Result<Page<T>, FetchError>>,
{
    PaginationCursor::new(fetch_page, options)
}

impl<T, F, Fut> PaginationCursor<T, F>
where
    F: FnMut(u32, u32) -> Fut,
    Fut: Future<Output = Result<Page<T>, FetchError>>,
{
    pub fn new(fetch_page: F, options: PageOptions) -> Self {
        Self {
            fetch_page,
            state: PaginationState {
                next_page: options.first_page,
                page_size: options.page_size,
                exhausted: false,
            },
            delay: options.delay,
            pages_fetched: 0,
            _items: std::marker::PhantomData,
        }
    }

    pub fn state(&self) -> PaginationState {
        self.state
    }

    pub fn is_exhausted(&self) -> bool {
        self.state.exhausted
    }

    /// Next non-empty page of items, `Ok(None)` once the cursor is done.
    ///
    /// An error is returned once and leaves the cursor exhausted.
    pub async fn next_page(&mut self) -> Result<Option<Vec<T>>, FetchError> {
        if self.state.exhausted {
            return Ok(None);
        }
        if self.pages_fetched > 0 && !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let page_index = self.state.next_page;
        let result = (self.fetch_page)(page_index, self.state.page_size).await;
        self.pages_fetched = self.pages_fetched.saturating_add(1);
        self.state.next_page = page_index.saturating_add(1);

        let page = match result {
            Ok(page) => page,
            Err(error) => {
                self.state.exhausted = true;
                tracing::warn!(page = page_index, error = %error, "page fetch failed");
                return Err(error);
            }
        };

        tracing::debug!(
            page = page_index,
            items = page.items.len(),
            is_last = page.is_last,
            "fetched page"
        );

        if page.items.is_empty() {
            self.state.exhausted = true;
            return Ok(None);
        }
        if page.is_last {
            self.state.exhausted = true;
        }
        Ok(Some(page.items))
    }

    /// Drain the cursor into one vector, stopping at the first error.
    pub async fn collect_all(mut self) -> Result<Vec<T>, FetchError> {
        let mut items = Vec::new();
        while let Some(page) = self.next_page().await? {
            items.extend(page);
        }
        Ok(items)
    }

    /// Flatten into a stream of items. A failed page shows up as one `Err`
    /// item, after which the stream ends.
    pub fn into_stream(self) -> impl Stream<Item = Result<T, FetchError>> {
        stream::unfold(self, |mut cursor| async move {
            match cursor.next_page().await {
                Ok(Some(items)) => Some((Ok(items), cursor)),
                Ok(None) => None,
                Err(error) => Some((Err(error), cursor)),
            }
        })
        .flat_map(|page| {
            let items: Vec<Result<T, FetchError>> = match page {
                Ok(items) => items.into_iter().map(Ok).collect(),
                Err(error) => vec![Err(error)],
            };
            stream::iter(items)
        })
    }
}

/// Page fetches against a JSON endpoint through a [`CachedFetcher`].
///
/// Each page is the base request plus page and size query parameters. Items
/// are read from `items_pointer` (a JSON pointer, `""` for the root). The last
/// page is detected from the boolean at `last_pointer` when set, otherwise a
/// short page is taken as the last one.
#[derive(Debug, Clone)]
pub struct PagedEndpoint {
    fetcher: CachedFetcher,
    request: FetchRequest,
    page_param: String,
    size_param: String,
    items_pointer: String,
    last_pointer: Option<String>,
}

impl PagedEndpoint {
    pub fn new(fetcher: CachedFetcher, request: FetchRequest) -> Self {
        Self {
            fetcher,
            request: request.decode_as(DecodeAs::Json),
            page_param: String::from("page"),
            size_param: String::from("size"),
            items_pointer: String::new(),
            last_pointer: None,
        }
    }

    pub fn with_page_params(mut self, page: impl Into<String>, size: impl Into<String>) -> Self {
        self.page_param = page.into();
        self.size_param = size.into();
        self
    }

    pub fn with_items_pointer(mut self, pointer: impl Into<String>) -> Self {
        self.items_pointer = pointer.into();
        self
    }

    pub fn with_last_pointer(mut self, pointer: impl Into<String>) -> Self {
        self.last_pointer = Some(pointer.into());
        self
    }

    pub async fn fetch_page(&self, page: u32, size: u32) -> Result<Page<Value>, FetchError> {
        let request = self
            .request
            .clone()
            .with_param(self.page_param.as_str(), page.to_string())
            .with_param(self.size_param.as_str(), size.to_string());
        let url = request.primary_url().unwrap_or_default().to_string();

        let body = self
            .fetcher
            .fetch(request)
            .await?
            .into_json()
            .unwrap_or_default();

        let items = match body.pointer(&self.items_pointer) {
            Some(Value::Array(items)) => items.clone(),
            Some(Value::Null) | None => Vec::new(),
            Some(_) => {
                return Err(FetchError::decode(
                    url,
                    format!("'{}' is not an array", self.items_pointer),
                ))
            }
        };

        let flagged_last = self
            .last_pointer
            .as_deref()
            .and_then(|pointer| body.pointer(pointer))
            .and_then(Value::as_bool);
        let is_last = flagged_last.unwrap_or_else(|| items.len() < size as usize);

        Ok(Page::new(items, is_last))
    }

    /// Cursor over this endpoint.
    pub fn cursor(
        self,
        options: PageOptions,
    ) -> PaginationCursor<Value, impl FnMut(u32, u32) -> PageFuture<Value>> {
        paginate(
            move |page, size| {
                let endpoint = self.clone();
                let future: PageFuture<Value> =
                    Box::pin(async move { endpoint.fetch_page(page, size).await });
                future
            },
            options,
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use futures::TryStreamExt;

    use super::*;

    fn numbered_source(
        total: u32,
        calls: Arc<Mutex<Vec<(u32, u32)>>>,
    ) -> impl FnMut(u32, u32) -> PageFuture<u32> {
        move |page, size| {
            calls.lock().unwrap().push((page, size));
            let start = (page - 1) * size;
            let end = (start + size).min(total);
            let items: Vec<u32> = (start..end).collect();
            let is_last = end >= total;
            Box::pin(async move { Ok(Page::new(items, is_last)) })
        }
    }

    #[tokio::test]
    async fn pages_are_yielded_in_order_until_last() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut cursor = paginate(numbered_source(250, calls.clone()), PageOptions::default());

        let mut sizes = Vec::new();
        let mut all = Vec::new();
        while let Some(page) = cursor.next_page().await.expect("no errors") {
            sizes.push(page.len());
            all.extend(page);
        }

        assert_eq!(sizes, vec![100, 100, 50]);
        assert_eq!(all, (0..250).collect::<Vec<_>>());
        assert_eq!(*calls.lock().unwrap(), vec![(1, 100), (2, 100), (3, 100)]);
        assert!(cursor.is_exhausted());
        assert_eq!(cursor.next_page().await, Ok(None));
    }

    #[tokio::test]
    async fn empty_page_ends_iteration_without_last_flag() {
        let mut cursor = paginate(
            |page, _size| async move {
                Ok(match page {
                    1 => Page::more(vec!["a", "b"]),
                    _ => Page::more(Vec::new()),
                })
            },
            PageOptions::default(),
        );

        assert_eq!(cursor.next_page().await, Ok(Some(vec!["a", "b"])));
        assert_eq!(cursor.next_page().await, Ok(None));
        assert_eq!(cursor.state().next_page, 3);
    }

    #[tokio::test]
    async fn error_terminates_cursor_after_earlier_items() {
        let stream = paginate(
            |page, _size| async move {
                match page {
                    1 => Ok(Page::more(vec![1, 2])),
                    _ => Err(FetchError::invalid_request("boom")),
                }
            },
            PageOptions::default(),
        )
        .into_stream();

        let items: Vec<Result<i32, FetchError>> = stream.collect().await;

        assert_eq!(items.len(), 3);
        assert_eq!(items[0], Ok(1));
        assert_eq!(items[1], Ok(2));
        assert!(items[2].is_err());
    }

    #[tokio::test]
    async fn collect_all_stops_at_first_error() {
        let result = paginate(
            |_page, _size| async { Err::<Page<u8>, _>(FetchError::invalid_request("down")) },
            PageOptions::default(),
        )
        .collect_all()
        .await;

        assert!(matches!(result, Err(FetchError::InvalidRequest { .. })));
    }

    #[tokio::test]
    async fn custom_first_page_and_size_are_passed_through() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let recorded = calls.clone();
        let items = paginate(
            move |page, size| {
                recorded.lock().unwrap().push((page, size));
                async move { Ok(Page::new(vec![page], page >= 2)) }
            },
            PageOptions::default().with_first_page(0).with_page_size(10),
        )
        .into_stream()
        .try_collect::<Vec<_>>()
        .await
        .expect("no errors");

        assert_eq!(items, vec![0, 1, 2]);
        assert_eq!(*calls.lock().unwrap(), vec![(0, 10), (1, 10), (2, 10)]);
    }

    #[tokio::test(start_paused = true)]
    async fn delay_is_applied_between_pages_only() {
        let started = tokio::time::Instant::now();
        let items = paginate(
            |page, _size| async move { Ok(Page::new(vec![page], page == 3)) },
            PageOptions::default().with_delay(Duration::from_secs(2)),
        )
        .collect_all()
        .await
        .expect("no errors");

        assert_eq!(items, vec![1, 2, 3]);
        assert!(started.elapsed() >= Duration::from_secs(4));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
