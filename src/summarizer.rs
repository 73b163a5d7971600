//! The inference call that turns the prompt into a trend summary.

use crate::config::INFERENCE_TIMEOUT;
use crate::error::AnalyzerError;
use crate::http::{RequestSpec, RetryingClient};
use crate::models::{ChatMessage, ChatOptions, ChatRequest, ChatResponse};
use std::time::Instant;
use tracing::{info, instrument};

pub struct Summarizer<'a> {
    client: &'a RetryingClient,
    base_url: &'a str,
    model: &'a str,
    options: ChatOptions,
}

impl<'a> Summarizer<'a> {
    pub fn new(client: &'a RetryingClient, base_url: &'a str, model: &'a str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/'),
            model,
            options: ChatOptions::default(),
        }
    }

    pub fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }

    /// Send `prompt` as a single user message and return the reply text.
    ///
    /// # Errors
    ///
    /// - [`AnalyzerError::RetriesExhausted`] when every attempt failed
    /// - [`AnalyzerError::DataShape`] when the reply has no `message.content`
    /// - [`AnalyzerError::EmptySummary`] when the content is blank
    #[instrument(level = "info", skip_all, fields(model = %self.model))]
    pub async fn summarize(&self, prompt: &str) -> Result<String, AnalyzerError> {
        let request = ChatRequest {
            model: self.model,
            messages: vec![ChatMessage::user(prompt)],
            stream: false,
            options: self.options,
        };
        let spec = RequestSpec::post_json(
            self.chat_url(),
            serde_json::to_value(&request)?,
            INFERENCE_TIMEOUT,
        );
        info!(
            url = %spec.url,
            num_ctx = self.options.num_ctx,
            "Calling Ollama chat API, context window {} tokens",
            self.options.num_ctx
        );

        let t0 = Instant::now();
        let body = self.client.send_json(&spec, "Ollama chat").await?;
        let response: ChatResponse = serde_json::from_value(body)
            .map_err(|e| AnalyzerError::data_shape("chat response", e.to_string()))?;
        let content = response
            .message
            .and_then(|m| m.content)
            .ok_or_else(|| AnalyzerError::data_shape("chat response", "missing `message.content`"))?;

        if content.trim().is_empty() {
            return Err(AnalyzerError::EmptySummary);
        }
        info!(
            chars = content.chars().count(),
            elapsed_ms = t0.elapsed().as_millis(),
            "Summary generated"
        );
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(attempts: u32) -> RetryingClient {
        RetryingClient::new(RetryPolicy::new(attempts, Duration::ZERO)).unwrap()
    }

    #[tokio::test]
    async fn test_returns_message_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({
                "model": "qwen2.5:14b",
                "stream": false,
                "options": {"num_predict": 800, "num_ctx": 2048}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "qwen2.5:14b",
                "message": {"role": "assistant", "content": "摘要"},
                "done": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(5);
        let base = server.uri();
        let summary = Summarizer::new(&client, &base, "qwen2.5:14b")
            .summarize("prompt")
            .await
            .unwrap();
        assert_eq!(summary, "摘要");
    }

    #[tokio::test]
    async fn test_missing_message_is_a_shape_error_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"done": true})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(5);
        let base = server.uri();
        let err = Summarizer::new(&client, &base, "m")
            .summarize("prompt")
            .await
            .unwrap_err();
        assert!(matches!(err, AnalyzerError::DataShape { .. }), "{err}");
    }

    #[tokio::test]
    async fn test_blank_content_is_empty_summary() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"message": {"role": "assistant", "content": "  \n"}})),
            )
            .mount(&server)
            .await;

        let client = client(1);
        let base = server.uri();
        let err = Summarizer::new(&client, &base, "m")
            .summarize("prompt")
            .await
            .unwrap_err();
        assert!(matches!(err, AnalyzerError::EmptySummary));
    }

    #[tokio::test]
    async fn test_server_errors_exhaust_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let client = client(3);
        let base = server.uri();
        let err = Summarizer::new(&client, &base, "m")
            .summarize("prompt")
            .await
            .unwrap_err();
        assert!(matches!(err, AnalyzerError::RetriesExhausted { attempts: 3, .. }));
    }
}
