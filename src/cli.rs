//! Command-line interface definitions for Hot Trends.
//!
//! Two subcommands share the binary:
//! - `run` executes one analysis end to end and writes a JSON artifact
//! - `serve` starts the HTTP service, which launches `run` as a child
//!   process for every analysis request
//!
//! Every `serve` option can also come from an environment variable (or a
//! `.env` file), which is how container deployments configure it.

use crate::config::{DEFAULT_MODEL, DEFAULT_PLATFORMS};
use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Command-line arguments for Hot Trends.
///
/// # Examples
///
/// ```sh
/// # One analysis run against local services
/// hot_trends run --hot-search-api http://127.0.0.1:10880 --ollama-api http://127.0.0.1:11434
///
/// # Only two platforms, five topics each
/// hot_trends run --hot-search-api http://127.0.0.1:10880 --ollama-api http://127.0.0.1:11434 \
///     --platforms weibo zhihu --topics-per-platform 5
///
/// # HTTP service
/// OLLAMA_API=http://ollama:11434 hot_trends serve --bind 0.0.0.0:8000
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Collect hot searches, summarize them and save the result as JSON
    Run(RunArgs),
    /// Serve the analysis endpoints over HTTP
    Serve(ServeArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Hot-search proxy base URL, e.g. http://192.168.0.1:10880
    #[arg(long, value_parser = parse_base_url)]
    pub hot_search_api: String,

    /// Ollama base URL, e.g. http://192.168.0.1:11434
    #[arg(long, value_parser = parse_base_url)]
    pub ollama_api: String,

    /// Ollama model name
    #[arg(long, default_value = DEFAULT_MODEL)]
    pub ollama_model: String,

    /// Directory for result files (defaults to ~/hot_trends_analysis/outputs)
    #[arg(long)]
    pub save_dir: Option<PathBuf>,

    /// Platforms to analyze (space separated)
    #[arg(long, num_args = 1.., default_values = DEFAULT_PLATFORMS)]
    pub platforms: Vec<String>,

    /// Number of hot-search entries taken from each platform
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u32).range(1..))]
    pub topics_per_platform: u32,

    /// Attempts per network call before giving up
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_retries: u32,

    /// Seconds to wait between attempts
    #[arg(long, default_value = "5", value_parser = parse_delay)]
    pub retry_delay: Duration,
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Address the HTTP service listens on
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8000")]
    pub bind: SocketAddr,

    /// Hot-search proxy base URL handed to every run
    #[arg(
        long,
        env = "HOT_SEARCH_API",
        default_value = "http://localhost:8000/hot-search",
        value_parser = parse_base_url
    )]
    pub hot_search_api: String,

    /// Ollama base URL handed to every run
    #[arg(
        long,
        env = "OLLAMA_API",
        default_value = "http://localhost:11434",
        value_parser = parse_base_url
    )]
    pub ollama_api: String,

    /// Directory where runs write their results and `run.log`
    #[arg(long, env = "SAVE_DIR", default_value = "/app/outputs")]
    pub save_dir: PathBuf,

    /// Model used when a request does not name one
    #[arg(long, env = "DEFAULT_OLLAMA_MODEL", default_value = DEFAULT_MODEL)]
    pub default_model: String,

    /// Platforms used when a request does not list any (comma separated)
    #[arg(
        long,
        env = "DEFAULT_PLATFORMS",
        default_value = "weibo,zhihu,baidu,douyin,toutiao",
        value_delimiter = ','
    )]
    pub default_platforms: Vec<String>,

    /// Topics per platform used when a request does not set it
    #[arg(
        long,
        env = "DEFAULT_TOPICS_PER_PLATFORM",
        default_value_t = 10,
        value_parser = clap::value_parser!(u32).range(1..=50)
    )]
    pub default_topics_per_platform: u32,
}

/// Validate a base URL and strip trailing slashes so paths can be appended.
fn parse_base_url(raw: &str) -> Result<String, String> {
    let url = Url::parse(raw).map_err(|e| format!("invalid URL '{raw}': {e}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("unsupported scheme '{}' in '{raw}'", url.scheme()));
    }
    Ok(raw.trim_end_matches('/').to_string())
}

fn parse_delay(raw: &str) -> Result<Duration, String> {
    let secs: f64 = raw
        .parse()
        .map_err(|e| format!("invalid delay '{raw}': {e}"))?;
    Duration::try_from_secs_f64(secs).map_err(|e| format!("invalid delay '{raw}': {e}"))
}
