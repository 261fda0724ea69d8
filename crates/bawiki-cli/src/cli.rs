//! CLI argument definitions for bawiki.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `fetch` | Fetch one resource from an ordered list of mirrors |
//! | `pages` | Walk a paged JSON endpoint to the last page |
//! | `resolve` | Resolve user text against an alias table |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--format` | `json` | Output format (json, ndjson) |
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--retries` | `BAWIKI_REQ_RETRY` or `1` | Extra attempts on the first mirror |
//! | `--ttl-secs` | `BAWIKI_REQ_CACHE_TTL` or `10800` | Cache lifetime |
//! | `--timeout-ms` | `BAWIKI_REQ_TIMEOUT` or `10000` | Per-attempt timeout |
//! | `--route` | `direct` | Proxy route (direct, domestic, oversea) |
//!
//! # Examples
//!
//! ```bash
//! # Fetch with one fallback mirror
//! bawiki fetch https://mirror1.example/data/stu.json https://mirror2.example/data/stu.json
//!
//! # Walk a ranking endpoint, one item per line
//! bawiki --format ndjson pages https://api.example/rank --items-pointer /data/records \
//!     --last-pointer /data/lastPage --param server=1
//!
//! # Resolve nicknames against a local alias table
//! bawiki resolve 白子 "shiroko (swimsuit)" --table stu_alias.json
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};

use bawiki_core::{DecodeAs, ProxyRoute};

/// bawiki - cached multi-mirror fetch, pagination and alias lookup
#[derive(Debug, Parser)]
#[command(
    name = "bawiki",
    author,
    version,
    about = "Cached multi-mirror fetch, pagination and alias lookup",
    long_about = "bawiki drives the data layer of the bawiki bot from the command line:\n\
\n\
  • fetch a resource from several mirrors with retry and fallback\n\
  • walk paged endpoints lazily\n\
  • resolve nicknames to canonical keys\n\
\n\
Logging goes to stderr and is controlled by BAWIKI_LOG or RUST_LOG."
)]
pub struct Cli {
    /// Output format for results.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Extra attempts granted to the first mirror.
    #[arg(long, global = true)]
    pub retries: Option<u32>,

    /// Cache time-to-live in seconds; 0 disables caching.
    #[arg(long, global = true)]
    pub ttl_secs: Option<u64>,

    /// Per-attempt timeout in milliseconds.
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    /// Which configured proxy to route requests through.
    #[arg(long, global = true, value_enum, default_value_t = RouteArg::Direct)]
    pub route: RouteArg,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Single JSON object output.
    Json,
    /// Newline-delimited JSON, one item per line.
    Ndjson,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RouteArg {
    Direct,
    Domestic,
    Oversea,
}

impl From<RouteArg> for ProxyRoute {
    fn from(route: RouteArg) -> Self {
        match route {
            RouteArg::Direct => Self::Direct,
            RouteArg::Domestic => Self::Domestic,
            RouteArg::Oversea => Self::Oversea,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DecodeArg {
    Json,
    Text,
    Bytes,
    Metadata,
}

impl From<DecodeArg> for DecodeAs {
    fn from(decode: DecodeArg) -> Self {
        match decode {
            DecodeArg::Json => Self::Json,
            DecodeArg::Text => Self::Text,
            DecodeArg::Bytes => Self::Bytes,
            DecodeArg::Metadata => Self::Metadata,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch one resource, trying mirrors in order.
    ///
    /// The first URL gets the retry budget; every later URL is tried once.
    ///
    /// # Examples
    ///
    ///   bawiki fetch https://a.example/x.json https://b.example/x.json
    ///   bawiki fetch https://api.example/rank --param page=1 --param size=100
    ///   bawiki fetch https://a.example/img.png --decode metadata
    Fetch(FetchArgs),

    /// Walk a paged JSON endpoint until its last page.
    ///
    /// # Examples
    ///
    ///   bawiki pages https://api.example/rank --items-pointer /data/records
    ///   bawiki pages https://api.example/rank --page-size 50 --page-delay-ms 500
    Pages(PagesArgs),

    /// Resolve user text to canonical keys.
    ///
    /// # Examples
    ///
    ///   bawiki resolve 白子 --table stu_alias.json
    ///   bawiki resolve 白子 --table-url https://a.example/stu_alias.json
    Resolve(ResolveArgs),
}

/// Request shape shared by `fetch` and `pages`.
#[derive(Debug, Args)]
pub struct RequestArgs {
    /// Query parameter as `name=value`; repeatable.
    #[arg(long = "param", value_parser = parse_pair)]
    pub params: Vec<(String, String)>,

    /// Header as `name=value`; repeatable.
    #[arg(long = "header", value_parser = parse_pair)]
    pub headers: Vec<(String, String)>,

    /// Wait before the first attempt, in milliseconds.
    #[arg(long, default_value_t = 0)]
    pub delay_ms: u64,
}

#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Candidate URLs, primary first.
    #[arg(required = true, num_args = 1..)]
    pub urls: Vec<String>,

    #[command(flatten)]
    pub request: RequestArgs,

    /// How to decode the response body.
    #[arg(long, value_enum, default_value_t = DecodeArg::Json)]
    pub decode: DecodeArg,

    /// Accept non-2xx responses instead of treating them as failures.
    #[arg(long, default_value_t = false)]
    pub allow_status: bool,

    /// Issue the same request this many times concurrently.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub repeat: u32,
}

#[derive(Debug, Args)]
pub struct PagesArgs {
    /// Candidate URLs, primary first.
    #[arg(required = true, num_args = 1..)]
    pub urls: Vec<String>,

    #[command(flatten)]
    pub request: RequestArgs,

    /// Query parameter carrying the page index.
    #[arg(long, default_value = "page")]
    pub page_param: String,

    /// Query parameter carrying the page size.
    #[arg(long, default_value = "size")]
    pub size_param: String,

    /// JSON pointer to the item array; empty for the document root.
    #[arg(long, default_value = "")]
    pub items_pointer: String,

    /// JSON pointer to a boolean last-page flag.
    ///
    /// Without it a page shorter than the page size is the last one.
    #[arg(long)]
    pub last_pointer: Option<String>,

    #[arg(long, default_value_t = 1)]
    pub first_page: u32,

    #[arg(long, default_value_t = 100)]
    pub page_size: u32,

    /// Pause between page fetches in milliseconds.
    #[arg(long, default_value_t = 0)]
    pub page_delay_ms: u64,

    /// Stop after this many items.
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Debug, Args)]
pub struct ResolveArgs {
    /// Inputs to resolve.
    #[arg(required = true, num_args = 1..)]
    pub inputs: Vec<String>,

    /// Alias table JSON file.
    #[arg(long, conflicts_with = "table_url", required_unless_present = "table_url")]
    pub table: Option<std::path::PathBuf>,

    /// Alias table URLs, primary first.
    #[arg(long, num_args = 1..)]
    pub table_url: Vec<String>,

    /// Suffix alias JSON file, e.g. `{"Swimsuit": ["水着"]}`.
    #[arg(long)]
    pub suffixes: Option<std::path::PathBuf>,

    /// Report the matching tier with each key.
    #[arg(long, default_value_t = false)]
    pub explain: bool,
}

fn parse_pair(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty name in '{raw}'"));
    }
    Ok((name.to_string(), value.to_string()))
}
