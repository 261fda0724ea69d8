use bawiki_core::{CachedFetcher, Payload, ProxyRoute};
use serde_json::{json, Value};
use tokio::task::JoinSet;

use crate::cli::FetchArgs;
use crate::error::CliError;

use super::{build_request, CommandResult};

pub async fn run(
    args: &FetchArgs,
    fetcher: &CachedFetcher,
    route: ProxyRoute,
) -> Result<CommandResult, CliError> {
    let mut request = build_request(fetcher, &args.urls, &args.request, route)
        .decode_as(args.decode.into());
    if args.allow_status {
        request = request.without_status_check();
    }
    tracing::debug!(signature = %request.signature(), repeat = args.repeat, "fetching");

    let mut tasks = JoinSet::new();
    for _ in 0..args.repeat {
        let fetcher = fetcher.clone();
        let request = request.clone();
        tasks.spawn(async move { fetcher.fetch(request).await });
    }

    let mut first = None;
    while let Some(joined) = tasks.join_next().await {
        let payload = joined.map_err(|error| CliError::Command(error.to_string()))??;
        if first.is_none() {
            first = Some(payload);
        }
    }

    let payload = first.ok_or_else(|| CliError::Command(String::from("no fetch was issued")))?;
    Ok(CommandResult::ok(payload_to_json(payload)?))
}

fn payload_to_json(payload: Payload) -> Result<Value, CliError> {
    Ok(match payload {
        Payload::Json(value) => value,
        Payload::Text(text) => Value::String(text),
        Payload::Bytes(bytes) => json!({ "length": bytes.len() }),
        Payload::Metadata(meta) => serde_json::to_value(meta)?,
    })
}

#[cfg(test)]
mod tests {
    use bawiki_core::ResponseMeta;

    use super::*;

    #[test]
    fn binary_payloads_are_summarized() {
        let value = payload_to_json(Payload::Bytes(vec![0; 16])).expect("json");

        assert_eq!(value, json!({ "length": 16 }));
    }

    #[test]
    fn metadata_is_serialized_as_an_object() {
        let meta = ResponseMeta {
            status: 200,
            url: String::from("https://a.test/x.png"),
            headers: Default::default(),
            content_length: 4,
        };

        let value = payload_to_json(Payload::Metadata(meta)).expect("json");

        assert_eq!(value["status"], json!(200));
        assert_eq!(value["content_length"], json!(4));
    }
}
