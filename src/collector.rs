//! Hot-search topic collection.
//!
//! Platforms are fetched one at a time, in the requested order, with a short
//! pause between two fetches to keep the load on the proxy low. A platform that
//! cannot be fetched or parsed is logged and left out of the [`TopicSet`];
//! it never aborts the collection.

use crate::config::HOT_SEARCH_TIMEOUT;
use crate::error::AnalyzerError;
use crate::http::{RequestSpec, RetryingClient};
use crate::models::{HotSearchItem, TopicSet};
use serde::Deserialize;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, instrument, warn};

pub struct TopicCollector<'a> {
    client: &'a RetryingClient,
    base_url: &'a str,
    topics_per_platform: usize,
    pacing: Duration,
}

impl<'a> TopicCollector<'a> {
    pub fn new(client: &'a RetryingClient, base_url: &'a str, topics_per_platform: usize) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/'),
            topics_per_platform,
            pacing: Duration::ZERO,
        }
    }

    /// Pause inserted between two platforms.
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// `{base}/{platform}`, with the platform percent-encoded as one segment.
    pub fn platform_url(&self, platform: &str) -> String {
        format!("{}/{}", self.base_url, urlencoding::encode(platform))
    }

    /// Fetch every platform and keep those that yielded at least one title.
    #[instrument(level = "info", skip_all, fields(platforms = platforms.len()))]
    pub async fn collect(&self, platforms: &[String]) -> TopicSet {
        collect_paced(platforms, self.pacing, move |platform| async move {
            self.fetch_platform(&platform).await
        })
        .await
    }

    /// Fetch and extract the titles of a single platform.
    pub async fn fetch_platform(&self, platform: &str) -> Result<Vec<String>, AnalyzerError> {
        let spec = RequestSpec::get(self.platform_url(platform), HOT_SEARCH_TIMEOUT);
        let body = self
            .client
            .send_json(&spec, &format!("hot search {platform}"))
            .await?;
        extract_topics(&body, platform, self.topics_per_platform)
    }
}

/// Visit `platforms` in order, pausing `pacing` between two fetches (not
/// after the last one).
async fn collect_paced<F, Fut>(platforms: &[String], pacing: Duration, mut fetch: F) -> TopicSet
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<Vec<String>, AnalyzerError>>,
{
    let mut topic_set = TopicSet::new();

    for (i, platform) in platforms.iter().enumerate() {
        if i > 0 && !pacing.is_zero() {
            sleep(pacing).await;
        }

        info!(%platform, "Fetching {platform} hot searches");
        match fetch(platform.clone()).await {
            Ok(topics) if topics.is_empty() => {
                warn!(%platform, "{platform}: no hot-search titles could be extracted");
            }
            Ok(topics) => {
                info!(%platform, count = topics.len(), "{platform}: got {} hot searches", topics.len());
                topic_set.insert(platform.clone(), topics);
            }
            Err(e @ AnalyzerError::DataShape { .. }) => {
                warn!(%platform, error = %e, "{platform}: response could not be parsed");
            }
            Err(e) => {
                warn!(%platform, error = %e, "{platform}: fetch failed, skipping platform");
            }
        }
    }

    info!(
        platforms = topic_set.len(),
        topics = topic_set.topic_count(),
        "Topic collection finished"
    );
    topic_set
}

/// Take the titles of the first `limit` entries of `body["data"]`.
///
/// Entries without a title, or with an empty one, are skipped, so the result
/// may be shorter than `limit`. A missing or non-array `data`, or an entry
/// that is not an object with a string `title`, fails the whole platform.
pub fn extract_topics(body: &Value, platform: &str, limit: usize) -> Result<Vec<String>, AnalyzerError> {
    let data = body
        .get("data")
        .ok_or_else(|| AnalyzerError::data_shape(platform, "missing `data` field"))?;
    let items = data
        .as_array()
        .ok_or_else(|| AnalyzerError::data_shape(platform, "`data` is not a list"))?;

    let mut topics = Vec::with_capacity(limit.min(items.len()));
    for (rank, item) in items.iter().take(limit).enumerate() {
        let item = HotSearchItem::deserialize(item).map_err(|e| {
            AnalyzerError::data_shape(platform, format!("entry {}: {e}", rank + 1))
        })?;
        if let Some(title) = item.title.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()) {
            topics.push(title);
        }
    }
    Ok(topics)
}
