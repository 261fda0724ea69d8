use std::io::{self, Write};

use serde_json::Value;

use crate::cli::OutputFormat;
use crate::commands::CommandResult;
use crate::error::CliError;

pub fn render(result: &CommandResult, format: OutputFormat, pretty: bool) -> Result<(), CliError> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    write_result(&mut out, result, format, pretty)?;
    out.flush()?;
    Ok(())
}

/// JSON writes one envelope; NDJSON writes one line per array element of
/// `data` (or a single line for non-array data) and leaves metadata to the log.
pub fn write_result<W: Write>(
    out: &mut W,
    result: &CommandResult,
    format: OutputFormat,
    pretty: bool,
) -> Result<(), CliError> {
    match format {
        OutputFormat::Json => {
            let payload = if pretty {
                serde_json::to_string_pretty(result)?
            } else {
                serde_json::to_string(result)?
            };
            writeln!(out, "{payload}")?;
        }
        OutputFormat::Ndjson => match &result.data {
            Value::Array(items) => {
                for item in items {
                    writeln!(out, "{}", serde_json::to_string(item)?)?;
                }
            }
            other => writeln!(out, "{}", serde_json::to_string(other)?)?,
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn render_to_string(result: &CommandResult, format: OutputFormat) -> String {
        let mut buffer = Vec::new();
        write_result(&mut buffer, result, format, false).expect("render");
        String::from_utf8(buffer).expect("utf8")
    }

    #[test]
    fn ndjson_writes_one_line_per_item() {
        let result = CommandResult::ok(json!([{ "rank": 1 }, { "rank": 2 }]));

        let rendered = render_to_string(&result, OutputFormat::Ndjson);

        assert_eq!(rendered, "{\"rank\":1}\n{\"rank\":2}\n");
    }

    #[test]
    fn json_wraps_data_with_meta() {
        let result = CommandResult::ok(json!("ok")).with_latency(12);

        let rendered: Value =
            serde_json::from_str(&render_to_string(&result, OutputFormat::Json)).expect("json");

        assert_eq!(rendered["data"], json!("ok"));
        assert_eq!(rendered["meta"]["latency_ms"], json!(12));
    }
}
