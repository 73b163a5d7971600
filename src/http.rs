//! Bounded-retry HTTP calls with a constant delay.
//!
//! Both the hot-search proxy and the Ollama chat endpoint go through this
//! module. The strategy is deliberately simple:
//!
//! - at most [`RetryPolicy::max_attempts`] attempts
//! - the same [`RetryPolicy::delay`] before every retry (no backoff, no jitter)
//! - transport errors, non-2xx statuses, timeouts and non-JSON bodies are
//!   retried; any other error is handed back at once
//! - after the last attempt the caller gets
//!   [`AnalyzerError::RetriesExhausted`], never a panic
//!
//! Every failed attempt is logged, so a relayed run shows the retries live.

use crate::config::RetryPolicy;
use crate::error::AnalyzerError;
use reqwest::{Client, Method};
use serde_json::Value;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};

/// One HTTP call, described independently of the client that sends it.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: Method,
    pub url: String,
    /// JSON body, sent with `Content-Type: application/json`.
    pub body: Option<Value>,
    pub timeout: Duration,
}

impl RequestSpec {
    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            body: None,
            timeout,
        }
    }

    pub fn post_json(url: impl Into<String>, body: Value, timeout: Duration) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            body: Some(body),
            timeout,
        }
    }
}

/// Run `operation` until it succeeds, fails with a non-transient error, or
/// `policy.max_attempts` attempts have failed.
///
/// Sleeps `policy.delay` between attempts, so a call that fails `k` times
/// sleeps exactly `k` times (at most `max_attempts - 1`).
pub async fn retry_fixed<T, F, Fut>(
    policy: RetryPolicy,
    label: &str,
    mut operation: F,
) -> Result<T, AnalyzerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AnalyzerError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let total_t0 = Instant::now();
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let attempt_t0 = Instant::now();
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) => {
                let elapsed_ms_attempt = attempt_t0.elapsed().as_millis();
                if attempt >= max_attempts {
                    error!(
                        label,
                        attempt,
                        max = max_attempts,
                        elapsed_ms_attempt,
                        elapsed_ms_total = total_t0.elapsed().as_millis(),
                        error = %e,
                        "{label} failed, giving up after {max_attempts} attempts"
                    );
                    return Err(AnalyzerError::RetriesExhausted {
                        label: label.to_string(),
                        attempts: attempt,
                        last_error: e.to_string(),
                    });
                }

                warn!(
                    label,
                    attempt,
                    max = max_attempts,
                    elapsed_ms_attempt,
                    delay = ?policy.delay,
                    error = %e,
                    "{label} failed (attempt {attempt}/{max_attempts}); retrying in {:?}",
                    policy.delay
                );
                sleep(policy.delay).await;
            }
        }
    }
}

/// `reqwest` client paired with the retry policy of a run.
#[derive(Debug, Clone)]
pub struct RetryingClient {
    client: Client,
    policy: RetryPolicy,
}

impl RetryingClient {
    /// Build a client with a 10 s connect timeout. Per-request timeouts come
    /// from each [`RequestSpec`].
    pub fn new(policy: RetryPolicy) -> Result<Self, AnalyzerError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("hot_trends/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, policy })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Send `spec` under the retry policy and return the parsed JSON body.
    #[instrument(level = "debug", skip_all, fields(url = %spec.url))]
    pub async fn send_json(&self, spec: &RequestSpec, label: &str) -> Result<Value, AnalyzerError> {
        retry_fixed(self.policy, label, || self.send_once(spec)).await
    }

    /// A single attempt: send, require 2xx, parse the body as JSON.
    pub async fn send_once(&self, spec: &RequestSpec) -> Result<Value, AnalyzerError> {
        let t0 = Instant::now();
        let mut request = self
            .client
            .request(spec.method.clone(), &spec.url)
            .timeout(spec.timeout);
        if let Some(body) = &spec.body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| classify(e, spec))?;
        let status = response.status();
        if !status.is_success() {
            return Err(AnalyzerError::Status {
                url: spec.url.clone(),
                status: status.as_u16(),
            });
        }

        let text = response.text().await.map_err(|e| classify(e, spec))?;
        debug!(
            bytes = text.len(),
            elapsed_ms = t0.elapsed().as_millis(),
            "HTTP call completed"
        );
        serde_json::from_str(&text).map_err(|source| AnalyzerError::InvalidBody {
            url: spec.url.clone(),
            source,
        })
    }
}

pub(crate) fn classify(err: reqwest::Error, spec: &RequestSpec) -> AnalyzerError {
    if err.is_timeout() {
        AnalyzerError::Timeout {
            url: spec.url.clone(),
            secs: spec.timeout.as_secs(),
        }
    } else {
        AnalyzerError::Http(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transient() -> AnalyzerError {
        AnalyzerError::Status {
            url: "http://stub".to_string(),
            status: 503,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_n_minus_one_failures() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(5, Duration::from_secs(5));
        let start = tokio::time::Instant::now();

        let result = retry_fixed(policy, "stub", || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move { if n < 5 { Err(transient()) } else { Ok(n) } }
        })
        .await;

        assert_eq!(result.unwrap(), 5);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        // four sleeps of 5s, not five
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(20), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_secs(25), "elapsed {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_stub_exhausts_after_n_attempts() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_secs(2));
        let start = tokio::time::Instant::now();

        let result: Result<(), _> = retry_fixed(policy, "stub", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(transient()) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(start.elapsed() < Duration::from_secs(6));
        match result {
            Err(AnalyzerError::RetriesExhausted {
                label, attempts, ..
            }) => {
                assert_eq!(label, "stub");
                assert_eq!(attempts, 3);
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_transient_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_fixed(RetryPolicy::default(), "stub", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AnalyzerError::data_shape("stub", "bad")) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(AnalyzerError::DataShape { .. })));
    }

    #[tokio::test]
    async fn test_send_json_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/weibo"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/weibo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})))
            .expect(1)
            .mount(&server)
            .await;

        let client = RetryingClient::new(RetryPolicy::new(3, Duration::ZERO)).unwrap();
        let spec = RequestSpec::get(format!("{}/weibo", server.uri()), Duration::from_secs(5));
        let body = client.send_json(&spec, "hot search weibo").await.unwrap();
        assert_eq!(body, serde_json::json!({"data": []}));
    }

    #[tokio::test]
    async fn test_send_json_treats_non_json_body_as_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>busy</html>"))
            .expect(2)
            .mount(&server)
            .await;

        let client = RetryingClient::new(RetryPolicy::new(2, Duration::ZERO)).unwrap();
        let spec = RequestSpec::get(server.uri(), Duration::from_secs(5));
        let err = client.send_json(&spec, "proxy").await.unwrap_err();
        match err {
            AnalyzerError::RetriesExhausted { last_error, .. } => {
                assert!(last_error.contains("non-JSON"), "{last_error}");
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_post_json_sends_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_json(serde_json::json!({"model": "m"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let client = RetryingClient::new(RetryPolicy::new(1, Duration::ZERO)).unwrap();
        let spec = RequestSpec::post_json(
            format!("{}/api/chat", server.uri()),
            serde_json::json!({"model": "m"}),
            Duration::from_secs(5),
        );
        let body = client.send_json(&spec, "chat").await.unwrap();
        assert_eq!(body["ok"], true);
    }
}
