//! One analysis run, end to end.
//!
//! The run is a straight line of stages:
//!
//! ```text
//! GuardModel -> CollectTopics -> BuildPrompt -> Summarize -> Persist
//! ```
//!
//! Any stage failure ends the run with an error and nothing on disk. The
//! model guard runs first so a missing model is reported before any time is
//! spent on the proxy. An empty topic set ends the run before the model is
//! called.
//!
//! # Output
//!
//! ```text
//! save_dir/
//! ├── hot_trends_analysis_20250506_203000_123.json
//! └── hot_trends_analysis_20250506_211500_042.json
//! ```

use crate::collector::TopicCollector;
use crate::config::RunConfig;
use crate::error::AnalyzerError;
use crate::http::RetryingClient;
use crate::model_guard::ModelGuard;
use crate::models::AnalysisResult;
use crate::prompt::{build_prompt, site_name};
use crate::summarizer::Summarizer;
use crate::utils::{truncate_for_log, ARTIFACT_PREFIX};
use chrono::{DateTime, Local};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::fs;
use tracing::{error, info, instrument};

/// `timestamp` field of the artifact.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
/// Timestamp embedded in the artifact file name.
const FILE_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%3f";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    GuardModel,
    CollectTopics,
    BuildPrompt,
    Summarize,
    Persist,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::GuardModel => "guard model",
            Stage::CollectTopics => "collect topics",
            Stage::BuildPrompt => "build prompt",
            Stage::Summarize => "summarize",
            Stage::Persist => "persist",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub struct RunOutcome {
    pub path: PathBuf,
    pub result: AnalysisResult,
}

/// Run every stage in order and persist the result.
#[instrument(level = "info", skip_all, fields(model = %config.model))]
pub async fn run_analysis(
    config: &RunConfig,
    client: &RetryingClient,
) -> Result<RunOutcome, AnalyzerError> {
    let t0 = Instant::now();
    let mut stage = Stage::GuardModel;

    let outcome = async {
        info!(%stage, "Checking Ollama model {}", config.model);
        ModelGuard::new(client, &config.ollama_api)
            .ensure_model(&config.model)
            .await?;

        stage = Stage::CollectTopics;
        info!(%stage, platforms = ?config.platforms, "Collecting hot-search data");
        let topics = TopicCollector::new(client, &config.hot_search_api, config.topics_per_platform)
            .with_pacing(config.platform_pacing)
            .collect(&config.platforms)
            .await;
        if topics.is_empty() {
            return Err(AnalyzerError::NoTopics);
        }
        for (platform, titles) in topics.iter() {
            info!(
                %platform,
                site = site_name(platform).unwrap_or(platform),
                count = titles.len(),
                "Collected topics"
            );
        }

        stage = Stage::BuildPrompt;
        let prompt = build_prompt(&topics);
        info!(
            %stage,
            chars = prompt.chars().count(),
            "Prompt preview:\n{}",
            truncate_for_log(&prompt, 500)
        );

        stage = Stage::Summarize;
        info!(%stage, "Analyzing hot-search trends with Ollama");
        let analysis = Summarizer::new(client, &config.ollama_api, &config.model)
            .summarize(&prompt)
            .await?;
        info!("Analysis result:\n{analysis}");

        stage = Stage::Persist;
        let now = Local::now();
        let result = AnalysisResult::new(
            now.format(TIMESTAMP_FORMAT).to_string(),
            &config.model,
            topics,
            analysis,
        );
        let path = write_result(&result, &config.save_dir, &now).await?;
        Ok::<_, AnalyzerError>(RunOutcome { path, result })
    }
    .await;

    match &outcome {
        Ok(done) => info!(
            path = %done.path.display(),
            elapsed_ms = t0.elapsed().as_millis(),
            "Analysis saved to {}",
            done.path.display()
        ),
        Err(e) => error!(
            %stage,
            elapsed_ms = t0.elapsed().as_millis(),
            error = %e,
            "Run aborted during {stage}: {e}"
        ),
    }
    outcome
}

/// Write `result` as pretty JSON into `save_dir` and return the file path.
///
/// The file is first written under a hidden `.tmp` name and then renamed, so
/// readers never see a partial `.json` file. An existing file is never
/// overwritten; a numeric suffix is added instead.
#[instrument(level = "info", skip_all, fields(save_dir = %save_dir.display()))]
pub async fn write_result(
    result: &AnalysisResult,
    save_dir: &Path,
    now: &DateTime<Local>,
) -> Result<PathBuf, AnalyzerError> {
    fs::create_dir_all(save_dir).await?;
    let json = serde_json::to_string_pretty(result)?;

    let stem = format!("{ARTIFACT_PREFIX}{}", now.format(FILE_TIMESTAMP_FORMAT));
    let mut suffix = 0u32;
    let path = loop {
        let name = match suffix {
            0 => format!("{stem}.json"),
            n => format!("{stem}_{n}.json"),
        };
        let candidate = save_dir.join(name);
        if !fs::try_exists(&candidate).await? {
            break candidate;
        }
        suffix += 1;
    };

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = save_dir.join(format!(".{file_name}.tmp"));
    fs::write(&tmp, json).await?;
    if let Err(e) = fs::rename(&tmp, &path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    info!(path = %path.display(), "Wrote analysis JSON");
    Ok(path)
}
