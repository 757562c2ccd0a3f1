//! HTTP client abstraction for the Probe Dispatcher, grounded in the
//! teacher's `HealthCheckClient`/`IsahcHealthCheckClient` split: a narrow
//! trait so the dispatcher is testable without real network I/O, and a
//! production implementation backed by isahc.

use super::types::{ProbeConfig, ProbeError};
use async_trait::async_trait;
use isahc::config::{Configurable, RedirectPolicy};
use isahc::{AsyncReadResponseExt, HttpClient, Request, ResponseExt};
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct RawResponse {
    pub final_url: String,
    pub status_code: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub duration: Duration,
}

#[async_trait]
pub trait HttpProbeClient: Send + Sync {
    async fn send(
        &self,
        url: &str,
        method: &str,
        config: &ProbeConfig,
    ) -> Result<RawResponse, ProbeError>;
}

pub struct IsahcProbeClient {
    client: HttpClient,
}

impl IsahcProbeClient {
    pub fn new() -> Result<Self, ProbeError> {
        let client = HttpClient::builder()
            .cookies()
            .build()
            .map_err(|e| ProbeError::Other(format!("client build failed: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpProbeClient for IsahcProbeClient {
    async fn send(
        &self,
        url: &str,
        method: &str,
        config: &ProbeConfig,
    ) -> Result<RawResponse, ProbeError> {
        let start = Instant::now();

        let redirect_policy = if config.follow_redirects {
            RedirectPolicy::Limit(config.max_redirects)
        } else {
            RedirectPolicy::None
        };

        let mut builder = Request::builder()
            .method(method)
            .uri(url)
            .timeout(config.timeout)
            .redirect_policy(redirect_policy);

        for (name, value) in &config.custom_headers {
            builder = builder.header(name, value);
        }

        let request = builder
            .body(Vec::new())
            .map_err(|e| ProbeError::Other(format!("request build failed: {e}")))?;

        let mut response = self.client.send_async(request).await.map_err(|e| {
            if e.is_timeout() {
                ProbeError::Timeout
            } else {
                ProbeError::classify(&e.to_string())
            }
        })?;

        let final_url = response
            .effective_uri()
            .map(|u| u.to_string())
            .unwrap_or_else(|| url.to_string());
        let status_code = response.status().as_u16();

        let mut headers = HashMap::new();
        for (key, value) in response.headers() {
            if let Ok(value_str) = value.to_str() {
                headers.insert(key.to_string().to_ascii_lowercase(), value_str.to_string());
            }
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ProbeError::classify(&e.to_string()))?
            .to_vec();

        Ok(RawResponse {
            final_url,
            status_code,
            headers,
            body,
            duration: start.elapsed(),
        })
    }
}

/// Deterministic in-memory client for dispatcher unit tests.
#[derive(Default)]
pub struct MockProbeClient {
    pub responses: std::collections::HashMap<String, Result<RawResponse, ProbeError>>,
}

impl MockProbeClient {
    pub fn ok(mut self, url: &str, status_code: u16, body: &[u8]) -> Self {
        self.responses.insert(
            url.to_string(),
            Ok(RawResponse {
                final_url: url.to_string(),
                status_code,
                headers: HashMap::new(),
                body: body.to_vec(),
                duration: Duration::from_millis(1),
            }),
        );
        self
    }

    pub fn err(mut self, url: &str, error: ProbeError) -> Self {
        self.responses.insert(url.to_string(), Err(error));
        self
    }
}

#[async_trait]
impl HttpProbeClient for MockProbeClient {
    async fn send(
        &self,
        url: &str,
        _method: &str,
        _config: &ProbeConfig,
    ) -> Result<RawResponse, ProbeError> {
        match self.responses.get(url) {
            Some(Ok(resp)) => Ok(resp.clone()),
            Some(Err(e)) => Err(e.clone()),
            None => Err(ProbeError::Other(format!("no mock response for {url}"))),
        }
    }
}
