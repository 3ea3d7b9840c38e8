//! HTTP execution with transparent 429 backoff.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;

use crate::error::{Result, TagError};

/// Retries attempted after the first 429 before the response is handed back.
pub const MAX_RETRIES: u32 = 3;

/// Upper bound on a single backoff sleep, whatever the retry ceiling.
pub const MAX_BACKOFF: Duration = Duration::from_secs(64);

pub const STATUS_UNAUTHORIZED: u16 = 401;
pub const STATUS_TOO_MANY_REQUESTS: u16 = 429;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Put,
}

/// A fully described outbound request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn put(url: impl Into<String>, content_type: impl Into<String>, body: String) -> Self {
        Self {
            method: Method::Put,
            url: url.into(),
            headers: vec![("Content-Type".to_string(), content_type.into())],
            body: Some(body),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body)
            .map_err(|e| TagError::Transport(format!("invalid response body: {e}")))
    }
}

/// Sends a single request. Non-2xx statuses are responses, not errors; only a
/// missing response is an `Err`.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| TagError::Transport(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Put => self.client.put(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| TagError::Transport(e.to_string()))?;
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        Ok(HttpResponse { status, body })
    }
}

/// Issues requests and retries on 429 with exponential backoff
/// (`base_delay * 2^attempt`: 1s, 2s, 4s by default).
///
/// When the ceiling is reached the last 429 is returned as-is; callers must
/// check the status.
#[derive(Clone)]
pub struct RetryingExecutor {
    transport: Arc<dyn HttpTransport>,
    max_retries: u32,
    base_delay: Duration,
}

impl RetryingExecutor {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            max_retries: MAX_RETRIES,
            base_delay: Duration::from_secs(1),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let mut attempt = 0;
        loop {
            let resp = self.transport.send(request).await?;

            if resp.status == STATUS_TOO_MANY_REQUESTS && attempt < self.max_retries {
                let delay = self.backoff(attempt);
                tracing::warn!(
                    url = %request.url,
                    attempt = attempt + 1,
                    max = self.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "Rate limited (429), retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            return Ok(resp);
        }
    }

    /// `base_delay * 2^attempt`, capped at [`MAX_BACKOFF`].
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(MAX_BACKOFF)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use tokio::time::Instant;

    /// Replays canned responses and records when each request arrived.
    pub(crate) struct ScriptedTransport {
        responses: Mutex<VecDeque<Result<HttpResponse>>>,
        pub(crate) requests: Mutex<Vec<(HttpRequest, Instant)>>,
    }

    impl ScriptedTransport {
        pub(crate) fn new(responses: Vec<Result<HttpResponse>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn statuses(statuses: &[u16]) -> Arc<Self> {
            Self::new(
                statuses
                    .iter()
                    .map(|s| Ok(HttpResponse::new(*s, "")))
                    .collect(),
            )
        }

        pub(crate) fn call_count(&self) -> usize {
            self.requests.lock().len()
        }

        pub(crate) fn request(&self, index: usize) -> HttpRequest {
            self.requests.lock()[index].0.clone()
        }
    }

    #[async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
            self.requests.lock().push((request.clone(), Instant::now()));
            self.responses
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(TagError::Transport("script exhausted".into())))
        }
    }

    fn gaps(transport: &ScriptedTransport) -> Vec<u64> {
        let requests = transport.requests.lock();
        requests
            .windows(2)
            .map(|w| (w[1].1 - w[0].1).as_secs())
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn retries_rate_limit_with_exponential_backoff() {
        let transport = ScriptedTransport::statuses(&[429, 429, 200]);
        let executor = RetryingExecutor::new(transport.clone());

        let resp = executor.execute(&HttpRequest::get("http://x/a")).await.unwrap();

        assert_eq!(resp.status, 200);
        assert_eq!(transport.call_count(), 3);
        assert_eq!(gaps(&transport), [1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_return_final_429() {
        let transport = ScriptedTransport::statuses(&[429, 429, 429, 429]);
        let executor = RetryingExecutor::new(transport.clone());

        let resp = executor.execute(&HttpRequest::get("http://x/a")).await.unwrap();

        assert_eq!(resp.status, 429);
        assert_eq!(transport.call_count(), 4);
        assert_eq!(gaps(&transport), [1, 2, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn other_statuses_are_not_retried() {
        for status in [401, 500, 503, 404] {
            let transport = ScriptedTransport::statuses(&[status, 200]);
            let executor = RetryingExecutor::new(transport.clone());
            let resp = executor.execute(&HttpRequest::get("http://x/a")).await.unwrap();
            assert_eq!(resp.status, status);
            assert_eq!(transport.call_count(), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failure_is_not_retried() {
        let transport = ScriptedTransport::new(vec![
            Err(TagError::Transport("connection refused".into())),
            Ok(HttpResponse::new(200, "")),
        ]);
        let executor = RetryingExecutor::new(transport.clone());

        let err = executor.execute(&HttpRequest::get("http://x/a")).await.unwrap_err();

        assert!(matches!(err, TagError::Transport(_)));
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_ceiling_is_configurable() {
        let transport = ScriptedTransport::statuses(&[429, 429]);
        let executor = RetryingExecutor::new(transport.clone()).with_max_retries(1);
        let resp = executor.execute(&HttpRequest::get("http://x/a")).await.unwrap();
        assert_eq!(resp.status, 429);
        assert_eq!(transport.call_count(), 2);
    }

    #[test]
    fn backoff_is_capped_for_large_retry_ceilings() {
        let executor =
            RetryingExecutor::new(ScriptedTransport::statuses(&[])).with_max_retries(100);
        assert_eq!(executor.backoff(0), Duration::from_secs(1));
        assert_eq!(executor.backoff(2), Duration::from_secs(4));
        assert_eq!(executor.backoff(6), MAX_BACKOFF);
        assert_eq!(executor.backoff(32), MAX_BACKOFF);
        assert_eq!(executor.backoff(99), MAX_BACKOFF);
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let req = HttpRequest::get("http://x").header("Authorization", "Bearer t");
        assert_eq!(req.header_value("authorization"), Some("Bearer t"));
        assert_eq!(req.header_value("content-type"), None);
    }
}
