//! Supervise one analysis run in a child process and turn its output into
//! events.
//!
//! The HTTP service never runs the pipeline in-process. Each request spawns
//! `hot_trends run ...` (see [`RelayCommand::for_run`]), so a crash or hang in
//! a run cannot take the service down. While the child runs:
//!
//! - stdout and stderr are read line by line and merged as they arrive
//! - every line is mirrored to our own log, appended to `run.log` in the save
//!   directory (truncated when the run starts), and sent as
//!   [`RelayEvent::Log`]
//! - when the child exits, exactly one final event is sent: either
//!   [`RelayEvent::Complete`] with the parsed artifact or [`RelayEvent::Error`]
//!
//! Dropping the event receiver stops the relay and kills the child.

use crate::config::{ServerConfig, DEFAULT_MODEL, MAX_TOPICS_PER_PLATFORM};
use crate::error::AnalyzerError;
use crate::utils::artifact_names;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, OwnedMutexGuard};
use tracing::{error, info, instrument, warn};

/// Name of the per-run log file inside the save directory.
pub const RUN_LOG: &str = "run.log";

const EVENT_BUFFER: usize = 64;

/// Body of an analyze request. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunRequest {
    #[serde(default)]
    pub ollama_model: Option<String>,
    #[serde(default)]
    pub topics_per_platform: Option<u32>,
    #[serde(default)]
    pub platforms: Option<Vec<String>>,
}

/// A request with the server defaults filled in and validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlan {
    pub model: String,
    pub topics_per_platform: u32,
    pub platforms: Vec<String>,
}

impl RunRequest {
    /// Apply server defaults and validate the result.
    ///
    /// Returns a human-readable message when the request is invalid.
    pub fn resolve(self, config: &ServerConfig) -> Result<RunPlan, String> {
        let model = self
            .ollama_model
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| {
                if config.default_model.is_empty() {
                    DEFAULT_MODEL.to_string()
                } else {
                    config.default_model.clone()
                }
            });

        let topics_per_platform = self
            .topics_per_platform
            .unwrap_or(config.default_topics_per_platform);
        if !(1..=MAX_TOPICS_PER_PLATFORM).contains(&topics_per_platform) {
            return Err(format!(
                "topics_per_platform must be between 1 and {MAX_TOPICS_PER_PLATFORM}, got {topics_per_platform}"
            ));
        }

        let platforms: Vec<String> = self
            .platforms
            .unwrap_or_else(|| config.default_platforms.clone())
            .into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        if platforms.is_empty() {
            return Err("platforms must name at least one platform".to_string());
        }

        Ok(RunPlan {
            model,
            topics_per_platform,
            platforms,
        })
    }
}

/// What the relay reports to its consumer, in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RelayEvent {
    /// One line of child output.
    Log { message: String },
    /// The run failed. Always the last event.
    Error { message: String },
    /// The run succeeded; `result` is the artifact JSON. Always the last event.
    Complete { result: Value },
}

/// The program and arguments launched for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl RelayCommand {
    /// `<analyzer> run ...` with every option spelled out.
    pub fn for_run(config: &ServerConfig, plan: &RunPlan) -> Self {
        let mut args: Vec<String> = vec![
            "run".into(),
            "--hot-search-api".into(),
            config.hot_search_api.clone(),
            "--ollama-api".into(),
            config.ollama_api.clone(),
            "--ollama-model".into(),
            plan.model.clone(),
            "--save-dir".into(),
            config.save_dir.to_string_lossy().into_owned(),
            "--topics-per-platform".into(),
            plan.topics_per_platform.to_string(),
            "--platforms".into(),
        ];
        args.extend(plan.platforms.iter().cloned());
        Self {
            program: config.analyzer_program.clone(),
            args,
        }
    }
}

/// Start `command` in the background and return its event stream.
///
/// `run_guard` is held until the relay finishes, so the caller's run lock
/// stays taken for exactly as long as a child may be alive.
pub fn spawn_relay(
    command: RelayCommand,
    save_dir: PathBuf,
    run_guard: OwnedMutexGuard<()>,
) -> mpsc::Receiver<RelayEvent> {
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    tokio::spawn(async move {
        let _run_guard = run_guard;
        if let Err(e) = relay(&command, &save_dir, &tx).await {
            error!(error = %e, "Relay failed");
            let _ = tx
                .send(RelayEvent::Error {
                    message: e.to_string(),
                })
                .await;
        }
    });
    rx
}

/// Drain `events`, ignoring logs, and return the final result.
pub async fn run_buffered(
    mut events: mpsc::Receiver<RelayEvent>,
) -> Result<Value, AnalyzerError> {
    while let Some(event) = events.recv().await {
        match event {
            RelayEvent::Log { .. } => {}
            RelayEvent::Complete { result } => return Ok(result),
            RelayEvent::Error { message } => return Err(AnalyzerError::Relay(message)),
        }
    }
    Err(AnalyzerError::Relay(
        "analysis run ended without a result".to_string(),
    ))
}

#[instrument(level = "info", skip_all, fields(program = %command.program.display()))]
async fn relay(
    command: &RelayCommand,
    save_dir: &Path,
    events: &mpsc::Sender<RelayEvent>,
) -> Result<(), AnalyzerError> {
    fs::create_dir_all(save_dir).await?;
    let log_path = save_dir.join(RUN_LOG);
    let mut log = fs::File::create(&log_path).await?;
    let before = artifact_names(save_dir).await?;

    let mut child = Command::new(&command.program)
        .args(&command.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            AnalyzerError::Relay(format!(
                "failed to start {}: {e}",
                command.program.display()
            ))
        })?;
    info!(pid = ?child.id(), "Analysis run started");

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AnalyzerError::Relay("child stdout was not captured".to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AnalyzerError::Relay("child stderr was not captured".to_string()))?;

    let (line_tx, mut lines) = mpsc::channel::<String>(EVENT_BUFFER);
    tokio::spawn(forward_lines(stdout, line_tx.clone()));
    tokio::spawn(forward_lines(stderr, line_tx));

    loop {
        let line = tokio::select! {
            line = lines.recv() => line,
            () = events.closed() => {
                warn!("Event consumer went away, stopping the analysis run");
                return Ok(());
            }
        };
        let Some(line) = line else { break };

        info!(target: "hot_trends::run", "{line}");
        log.write_all(line.as_bytes()).await?;
        log.write_all(b"\n").await?;
        if events.send(RelayEvent::Log { message: line }).await.is_err() {
            warn!("Event consumer went away, stopping the analysis run");
            return Ok(());
        }
    }
    log.flush().await?;

    let status = child.wait().await?;
    let last = if status.success() {
        match load_new_artifact(save_dir, &before).await {
            Ok(result) => {
                info!("Analysis run completed");
                RelayEvent::Complete { result }
            }
            Err(reason) => {
                error!(%reason, "Analysis run produced no usable result");
                RelayEvent::Error {
                    message: format!("{reason}; see log at {}", log_path.display()),
                }
            }
        }
    } else {
        error!(%status, "Analysis run failed");
        RelayEvent::Error {
            message: format!(
                "analysis run failed ({status}); see log at {}",
                log_path.display()
            ),
        }
    };
    let _ = events.send(last).await;
    Ok(())
}

/// Read `reader` line by line into `tx` until EOF or the receiver is gone.
async fn forward_lines<R>(reader: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf)
                    .trim_end_matches(['\r', '\n'])
                    .to_string();
                if tx.send(line).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to read child output");
                break;
            }
        }
    }
}

/// Parse the artifact written by this run, i.e. a file absent from `before`.
///
/// When several appeared, the greatest name wins.
async fn load_new_artifact(save_dir: &Path, before: &BTreeSet<String>) -> Result<Value, String> {
    let after = artifact_names(save_dir)
        .await
        .map_err(|e| format!("cannot scan {}: {e}", save_dir.display()))?;
    let Some(name) = after.difference(before).max() else {
        return Err("analysis finished but wrote no result file".to_string());
    };
    let path = save_dir.join(name);
    let raw = fs::read_to_string(&path)
        .await
        .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    serde_json::from_str(&raw).map_err(|e| format!("invalid JSON in {}: {e}", path.display()))
}
