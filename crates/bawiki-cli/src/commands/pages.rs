use std::time::Duration;

use bawiki_core::{CachedFetcher, PageOptions, PagedEndpoint, ProxyRoute};
use serde_json::Value;

use crate::cli::PagesArgs;
use crate::error::CliError;

use super::{build_request, CommandResult};

pub async fn run(
    args: &PagesArgs,
    fetcher: &CachedFetcher,
    route: ProxyRoute,
) -> Result<CommandResult, CliError> {
    let request = build_request(fetcher, &args.urls, &args.request, route);

    let mut endpoint = PagedEndpoint::new(fetcher.clone(), request)
        .with_page_params(args.page_param.as_str(), args.size_param.as_str())
        .with_items_pointer(args.items_pointer.as_str());
    if let Some(pointer) = &args.last_pointer {
        endpoint = endpoint.with_last_pointer(pointer.as_str());
    }

    let options = PageOptions::default()
        .with_first_page(args.first_page)
        .with_page_size(args.page_size)
        .with_delay(Duration::from_millis(args.page_delay_ms));
    let mut cursor = endpoint.cursor(options);

    let mut items: Vec<Value> = Vec::new();
    let mut pages = 0_u32;
    let mut truncated = false;
    while let Some(page) = cursor.next_page().await? {
        pages += 1;
        items.extend(page);
        if let Some(limit) = args.limit {
            if items.len() >= limit {
                truncated = items.len() > limit || !cursor.is_exhausted();
                items.truncate(limit);
                break;
            }
        }
    }
    tracing::info!(pages, items = items.len(), truncated, "pagination finished");

    let mut result = CommandResult::ok(Value::Array(items));
    if truncated {
        result = result.with_warning(format!(
            "stopped at --limit after {pages} pages; more items may exist"
        ));
    }
    Ok(result)
}
