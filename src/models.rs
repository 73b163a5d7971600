//! Data models for topics, results and the external APIs.
//!
//! - [`TopicSet`]: ranked hot-search titles per platform, in collection order
//! - [`AnalysisResult`]: the persisted artifact of one run
//! - [`HotSearchItem`]: one entry of the hot-search proxy's `data` array
//! - [`TagsResponse`], [`PullStatus`], [`ChatRequest`], [`ChatResponse`]:
//!   the Ollama endpoints used by the guard and the summarizer

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Hot-search titles per platform.
///
/// Platforms keep the order in which they were inserted and each platform's
/// titles keep their source ranking. A platform is only ever present with at
/// least one title: [`TopicSet::insert`] drops empty lists.
///
/// Serializes as a JSON object keyed by platform identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicSet {
    entries: Vec<(String, Vec<String>)>,
}

impl TopicSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a platform's topics. Returns `false` (and stores nothing) when
    /// `topics` is empty. A platform inserted twice keeps its first position
    /// and takes the new topics.
    pub fn insert(&mut self, platform: impl Into<String>, topics: Vec<String>) -> bool {
        if topics.is_empty() {
            return false;
        }
        let platform = platform.into();
        match self.entries.iter_mut().find(|(p, _)| *p == platform) {
            Some((_, existing)) => *existing = topics,
            None => self.entries.push((platform, topics)),
        }
        true
    }

    pub fn get(&self, platform: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(p, _)| p == platform)
            .map(|(_, topics)| topics.as_slice())
    }

    pub fn platforms(&self) -> Vec<String> {
        self.entries.iter().map(|(p, _)| p.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(p, topics)| (p.as_str(), topics.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn topic_count(&self) -> usize {
        self.entries.iter().map(|(_, topics)| topics.len()).sum()
    }
}

impl Serialize for TopicSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (platform, topics) in &self.entries {
            map.serialize_entry(platform, topics)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for TopicSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TopicSetVisitor;

        impl<'de> Visitor<'de> for TopicSetVisitor {
            type Value = TopicSet;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of platform to topic titles")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<TopicSet, A::Error> {
                let mut set = TopicSet::new();
                while let Some((platform, topics)) = access.next_entry::<String, Vec<String>>()? {
                    set.insert(platform, topics);
                }
                Ok(set)
            }
        }

        deserializer.deserialize_map(TopicSetVisitor)
    }
}

/// The persisted outcome of one successful run.
///
/// Written once, as `hot_trends_analysis_<timestamp>.json`, after the
/// summary call succeeds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisResult {
    /// Local time of persistence, `YYYY-MM-DD HH:MM:SS`.
    pub timestamp: String,
    pub model_used: String,
    /// Platforms present in `raw_data`, in the same order.
    pub platforms_analyzed: Vec<String>,
    pub raw_data: TopicSet,
    /// The generated summary text.
    pub analysis: String,
}

impl AnalysisResult {
    pub fn new(timestamp: String, model_used: &str, raw_data: TopicSet, analysis: String) -> Self {
        Self {
            timestamp,
            model_used: model_used.to_string(),
            platforms_analyzed: raw_data.platforms(),
            raw_data,
            analysis,
        }
    }
}

/// One entry of a hot-search listing. Only `title` is used; the proxy sends
/// more fields (url, hot value, ...) which are ignored.
#[derive(Debug, Deserialize)]
pub struct HotSearchItem {
    #[serde(default)]
    pub title: Option<String>,
}

/// `GET /api/tags`
#[derive(Debug, Deserialize)]
pub struct TagsResponse {
    #[serde(default)]
    pub models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
pub struct ModelTag {
    pub name: String,
}

/// `POST /api/pull` request body.
#[derive(Debug, Serialize)]
pub struct PullRequest<'a> {
    pub name: &'a str,
}

/// One line of the newline-delimited `POST /api/pull` stream.
#[derive(Debug, Deserialize)]
pub struct PullStatus {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub completed: Option<u64>,
    #[serde(default)]
    pub total: Option<u64>,
}

/// `POST /api/chat` request body.
#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    pub options: ChatOptions,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct ChatOptions {
    pub temperature: f32,
    pub num_predict: u32,
    pub num_ctx: u32,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            num_predict: 800,
            num_ctx: 2048,
        }
    }
}

/// `POST /api/chat` response with `stream: false`.
#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub message: Option<ChatReply>,
}

#[derive(Debug, Deserialize)]
pub struct ChatReply {
    #[serde(default)]
    pub content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topics(titles: &[&str]) -> Vec<String> {
        titles.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_topic_set_skips_empty_lists() {
        let mut set = TopicSet::new();
        assert!(!set.insert("weibo", vec![]));
        assert!(set.insert("zhihu", topics(&["A"])));
        assert!(set.get("weibo").is_none());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_topic_set_serializes_in_insertion_order() {
        let mut set = TopicSet::new();
        set.insert("zhihu", topics(&["Z1", "Z2"]));
        set.insert("baidu", topics(&["B1"]));
        set.insert("36kr", topics(&["K1"]));

        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(
            json,
            r#"{"zhihu":["Z1","Z2"],"baidu":["B1"],"36kr":["K1"]}"#
        );

        let back: TopicSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back.platforms(), vec!["zhihu", "baidu", "36kr"]);
        assert_eq!(back.topic_count(), 4);
    }

    #[test]
    fn test_analysis_result_lists_platforms_from_raw_data() {
        let mut set = TopicSet::new();
        set.insert("weibo", topics(&["热搜一"]));
        set.insert("douyin", topics(&["热点"]));
        let result = AnalysisResult::new(
            "2025-05-06 20:30:00".to_string(),
            "qwen2.5:14b",
            set,
            "摘要".to_string(),
        );
        assert_eq!(result.platforms_analyzed, vec!["weibo", "douyin"]);

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["raw_data"]["weibo"][0], "热搜一");
        assert_eq!(value["analysis"], "摘要");
        assert_eq!(value["model_used"], "qwen2.5:14b");
    }

    #[test]
    fn test_chat_request_shape() {
        let request = ChatRequest {
            model: "qwen2.5:14b",
            messages: vec![ChatMessage::user("hi")],
            stream: false,
            options: ChatOptions::default(),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["stream"], false);
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["options"]["num_predict"], 800);
        assert_eq!(value["options"]["num_ctx"], 2048);
        assert!((value["options"]["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_chat_response_without_message() {
        let response: ChatResponse = serde_json::from_str(r#"{"done":true}"#).unwrap();
        assert!(response.message.is_none());
    }
}
