//! Make sure the inference model exists before a run spends time on anything
//! else.
//!
//! The guard asks Ollama for its installed models (`GET /api/tags`). If the
//! requested model is missing it starts a pull (`POST /api/pull`) and reads
//! the newline-delimited status stream as it arrives, logging each status
//! line, until the server closes the stream. A pull may take as long as the
//! download needs; only a stalled stream (no bytes for [`PULL_TIMEOUT`]) is
//! treated as a failure.
//!
//! Every failure (unreachable server, malformed JSON, an `error` reported
//! inside the pull stream) is returned as [`AnalyzerError::ModelUnavailable`].

use crate::config::{CATALOG_TIMEOUT, PULL_TIMEOUT};
use crate::error::AnalyzerError;
use crate::http::{classify, RequestSpec, RetryingClient};
use crate::models::{PullRequest, PullStatus, TagsResponse};
use futures::StreamExt;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelStatus {
    /// Already installed.
    Present,
    /// Installed by this guard.
    Pulled,
}

pub struct ModelGuard<'a> {
    client: &'a RetryingClient,
    base_url: &'a str,
    pull_idle_timeout: Duration,
}

impl<'a> ModelGuard<'a> {
    pub fn new(client: &'a RetryingClient, base_url: &'a str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/'),
            pull_idle_timeout: PULL_TIMEOUT,
        }
    }

    #[cfg(test)]
    fn with_pull_idle_timeout(mut self, idle: Duration) -> Self {
        self.pull_idle_timeout = idle;
        self
    }

    /// Succeed once `model` is installed, pulling it if necessary.
    #[instrument(level = "info", skip(self))]
    pub async fn ensure_model(&self, model: &str) -> Result<ModelStatus, AnalyzerError> {
        self.check_or_pull(model).await.map_err(|e| match e {
            e @ AnalyzerError::ModelUnavailable { .. } => e,
            other => AnalyzerError::ModelUnavailable {
                model: model.to_string(),
                reason: other.to_string(),
            },
        })
    }

    async fn check_or_pull(&self, model: &str) -> Result<ModelStatus, AnalyzerError> {
        let installed = self.installed_models().await?;
        if installed.iter().any(|name| model_matches(name, model)) {
            info!(%model, "Model already present: {model}");
            return Ok(ModelStatus::Present);
        }

        info!(%model, installed = installed.len(), "Model not found, pulling {model} ...");
        self.pull(model).await?;
        info!(%model, "Model pull finished: {model}");
        Ok(ModelStatus::Pulled)
    }

    /// Names reported by `GET /api/tags`. Single attempt.
    pub async fn installed_models(&self) -> Result<Vec<String>, AnalyzerError> {
        let spec = RequestSpec::get(format!("{}/api/tags", self.base_url), CATALOG_TIMEOUT);
        let body = self.client.send_once(&spec).await?;
        let tags: TagsResponse = serde_json::from_value(body)
            .map_err(|e| AnalyzerError::data_shape("model catalog", e.to_string()))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Pull `model` and drain the status stream.
    ///
    /// There is no bound on the whole pull. Waiting for the response headers
    /// and for every following chunk is bounded by the idle timeout.
    async fn pull(&self, model: &str) -> Result<(), AnalyzerError> {
        let spec = RequestSpec::post_json(
            format!("{}/api/pull", self.base_url),
            serde_json::to_value(PullRequest { name: model })?,
            self.pull_idle_timeout,
        );
        let stalled = || AnalyzerError::Timeout {
            url: spec.url.clone(),
            secs: spec.timeout.as_secs(),
        };

        let request = self.client.client().post(&spec.url).json(&spec.body).send();
        let response = timeout(spec.timeout, request)
            .await
            .map_err(|_| stalled())?
            .map_err(|e| classify(e, &spec))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AnalyzerError::Status {
                url: spec.url.clone(),
                status: status.as_u16(),
            });
        }

        let mut stream = response.bytes_stream();
        let mut pending: Vec<u8> = Vec::new();
        loop {
            let next = timeout(spec.timeout, stream.next())
                .await
                .map_err(|_| stalled())?;
            let Some(chunk) = next else { break };
            let chunk = chunk.map_err(|e| classify(e, &spec))?;
            pending.extend_from_slice(&chunk);
            while let Some(newline) = pending.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = pending.drain(..=newline).collect();
                report_pull_line(&line, model)?;
            }
        }
        report_pull_line(&pending, model)?;
        Ok(())
    }
}

/// Ollama treats a name without a tag as `<name>:latest`.
pub fn model_matches(installed: &str, requested: &str) -> bool {
    if installed == requested {
        return true;
    }
    !requested.contains(':')
        && installed
            .strip_prefix(requested)
            .is_some_and(|rest| rest == ":latest")
}

/// Parse one line of the pull stream and log its status.
fn report_pull_line(line: &[u8], model: &str) -> Result<Option<String>, AnalyzerError> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }

    let status: PullStatus = serde_json::from_str(text)
        .map_err(|e| AnalyzerError::data_shape(format!("pull {model}"), e.to_string()))?;
    if let Some(reason) = status.error {
        return Err(AnalyzerError::ModelUnavailable {
            model: model.to_string(),
            reason,
        });
    }

    let Some(message) = status.status else {
        return Ok(None);
    };
    let line = match (status.completed, status.total) {
        (Some(done), Some(total)) if total > 0 => {
            format!("{message} ({}%)", done.saturating_mul(100) / total)
        }
        _ => message,
    };
    info!(%model, "   {line}");
    Ok(Some(line))
}
