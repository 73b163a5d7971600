//! Run and server configuration.
//!
//! CLI arguments are converted once into these structs at startup and then
//! passed by reference. Nothing here reads the environment after that point.

use crate::cli::{RunArgs, ServeArgs};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "qwen2.5:14b";

/// `github` and `hackernews` have no entry in the prompt's site-name table and
/// appear in the prompt under their identifiers.
pub const DEFAULT_PLATFORMS: [&str; 10] = [
    "weibo",
    "zhihu",
    "baidu",
    "bilibili",
    "douyin",
    "toutiao",
    "36kr",
    "ithome",
    "github",
    "hackernews",
];

/// Per-call timeout for hot-search proxy requests.
pub const HOT_SEARCH_TIMEOUT: Duration = Duration::from_secs(10);
/// Per-call timeout for chat completions; generation is slow.
pub const INFERENCE_TIMEOUT: Duration = Duration::from_secs(180);
/// Timeout for the model catalog query.
pub const CATALOG_TIMEOUT: Duration = Duration::from_secs(10);
/// Longest silence tolerated on a model pull stream. The pull as a whole is
/// unbounded.
pub const PULL_TIMEOUT: Duration = Duration::from_secs(600);
/// Pause between two platform fetches so the proxy is not hammered.
pub const PLATFORM_PACING: Duration = Duration::from_millis(500);

/// Upper bound accepted for topics-per-platform on the HTTP surface.
pub const MAX_TOPICS_PER_PLATFORM: u32 = 50;

/// Bounded retry with a constant delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, at least 1.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(5))
    }
}

/// Everything one analysis run needs.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Hot-search proxy base URL without a trailing slash.
    pub hot_search_api: String,
    /// Ollama base URL without a trailing slash.
    pub ollama_api: String,
    pub model: String,
    pub save_dir: PathBuf,
    pub platforms: Vec<String>,
    pub topics_per_platform: usize,
    pub retry: RetryPolicy,
    pub platform_pacing: Duration,
}

impl RunConfig {
    pub fn from_args(args: RunArgs) -> Self {
        let save_dir = args.save_dir.unwrap_or_else(default_save_dir);
        Self {
            hot_search_api: args.hot_search_api,
            ollama_api: args.ollama_api,
            model: args.ollama_model,
            save_dir,
            platforms: args.platforms,
            topics_per_platform: args.topics_per_platform as usize,
            retry: RetryPolicy::new(args.max_retries, args.retry_delay),
            platform_pacing: PLATFORM_PACING,
        }
    }
}

/// `~/hot_trends_analysis/outputs`, or a relative path when no home exists.
pub fn default_save_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hot_trends_analysis")
        .join("outputs")
}

/// Configuration of the HTTP service.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub hot_search_api: String,
    pub ollama_api: String,
    pub save_dir: PathBuf,
    pub default_model: String,
    pub default_platforms: Vec<String>,
    pub default_topics_per_platform: u32,
    /// Executable launched for each run; normally this very binary.
    pub analyzer_program: PathBuf,
}

impl ServerConfig {
    pub fn from_args(args: ServeArgs, analyzer_program: PathBuf) -> Self {
        let default_platforms = args
            .default_platforms
            .into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        Self {
            bind: args.bind,
            hot_search_api: args.hot_search_api,
            ollama_api: args.ollama_api,
            save_dir: args.save_dir,
            default_model: args.default_model,
            default_platforms,
            default_topics_per_platform: args.default_topics_per_platform,
            analyzer_program,
        }
    }
}
