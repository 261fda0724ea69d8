use bawiki_core::{AliasTable, CachedFetcher, FetchRequest, ProxyRoute, Resolution};
use serde_json::{json, Value};

use crate::cli::ResolveArgs;
use crate::error::CliError;

use super::CommandResult;

pub async fn run(
    args: &ResolveArgs,
    fetcher: &CachedFetcher,
    route: ProxyRoute,
) -> Result<CommandResult, CliError> {
    let mut table = match &args.table {
        Some(path) => AliasTable::load(path)?,
        None => {
            let request = fetcher.routed_request(args.table_url.iter().cloned(), route);
            load_remote(fetcher, request).await?
        }
    };
    if let Some(path) = &args.suffixes {
        let suffixes = AliasTable::load(path)?;
        for entry in suffixes.entries() {
            table.insert_suffix_aliases(entry.key(), entry.aliases().iter().cloned());
        }
    }

    Ok(CommandResult::ok(resolve_all(&args.inputs, &table, args.explain)))
}

async fn load_remote(fetcher: &CachedFetcher, request: FetchRequest) -> Result<AliasTable, CliError> {
    let value: Value = fetcher.fetch_json(request).await?;
    Ok(AliasTable::from_value(&value)?)
}

fn resolve_all(inputs: &[String], table: &AliasTable, explain: bool) -> Value {
    let resolved = inputs.iter().map(|input| {
        let resolution = Resolution::of(input, table);
        if explain {
            let matched = resolution.is_match();
            json!({
                "input": input,
                "key": resolution.key,
                "tier": resolution.tier,
                "matched": matched,
            })
        } else {
            Value::String(resolution.key)
        }
    });
    Value::Array(resolved.collect())
}
