//! # Hot Trends
//!
//! Collects "hot search" listings from many Chinese platforms through a
//! hot-search proxy API, asks a locally hosted Ollama model to summarize the
//! trends, and saves the summary with its raw inputs as a JSON file.
//!
//! ## Usage
//!
//! ```sh
//! # One run, printed to the terminal
//! hot_trends run --hot-search-api http://127.0.0.1:10880 --ollama-api http://127.0.0.1:11434
//!
//! # HTTP service that launches runs on request and streams their logs
//! hot_trends serve --bind 0.0.0.0:8000
//! ```
//!
//! ## Architecture
//!
//! A run is a straight pipeline:
//! 1. **Model guard**: make sure the model is installed, pulling it if needed
//! 2. **Collection**: fetch the top entries of every platform, one at a time
//! 3. **Prompt**: render instructions, the platform-name table and the topics
//! 4. **Summary**: a single chat completion
//! 5. **Output**: write `hot_trends_analysis_<timestamp>.json`
//!
//! `serve` never runs the pipeline itself. Each request spawns `hot_trends
//! run` as a child process and relays its output.

use clap::Parser;
use std::error::Error;
use std::io::IsTerminal;
use tracing::{error, info, instrument};
use tracing_subscriber::{fmt as tfmt, EnvFilter};

mod cli;
mod collector;
mod config;
mod error;
mod http;
mod model_guard;
mod models;
mod pipeline;
mod prompt;
mod relay;
mod server;
mod summarizer;
mod utils;

use cli::{Cli, Command, RunArgs, ServeArgs};
use config::{RunConfig, ServerConfig};
use http::RetryingClient;
use pipeline::run_analysis;
use utils::ensure_writable_dir;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();

    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_ansi(std::io::stdout().is_terminal())
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let args = Cli::parse();
    match args.command {
        Command::Run(run_args) => run(run_args).await,
        Command::Serve(serve_args) => serve(serve_args).await,
    }
}

#[instrument(level = "info", skip_all)]
async fn run(args: RunArgs) -> Result<(), Box<dyn Error>> {
    let start_time = std::time::Instant::now();
    let config = RunConfig::from_args(args);
    info!(
        hot_search_api = %config.hot_search_api,
        ollama_api = %config.ollama_api,
        model = %config.model,
        save_dir = %config.save_dir.display(),
        platforms = config.platforms.len(),
        topics_per_platform = config.topics_per_platform,
        "hot_trends run starting up"
    );

    let client = RetryingClient::new(config.retry)?;
    match run_analysis(&config, &client).await {
        Ok(outcome) => {
            info!(
                platforms = outcome.result.platforms_analyzed.len(),
                elapsed_ms = start_time.elapsed().as_millis(),
                "hot_trends run finished"
            );
            Ok(())
        }
        Err(e) => {
            error!(
                error = %e,
                elapsed_ms = start_time.elapsed().as_millis(),
                "hot_trends run failed"
            );
            Err(e.into())
        }
    }
}

#[instrument(level = "info", skip_all)]
async fn serve(args: ServeArgs) -> Result<(), Box<dyn Error>> {
    let analyzer_program = std::env::current_exe()?;
    let config = ServerConfig::from_args(args, analyzer_program);
    if config.default_platforms.is_empty() {
        return Err("DEFAULT_PLATFORMS must name at least one platform".into());
    }
    ensure_writable_dir(&config.save_dir).await?;
    info!(
        bind = %config.bind,
        hot_search_api = %config.hot_search_api,
        ollama_api = %config.ollama_api,
        save_dir = %config.save_dir.display(),
        default_model = %config.default_model,
        "hot_trends service starting up"
    );
    server::serve(config).await
}
