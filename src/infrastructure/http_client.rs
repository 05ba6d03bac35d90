//! JSON-over-HTTP client shared by the upstream adapters

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::domain::DomainError;

/// Trait for HTTP client operations (for mocking)
#[async_trait]
pub trait HttpClientTrait: Send + Sync + std::fmt::Debug {
    async fn post_json(
        &self,
        url: &str,
        headers: Vec<(&str, &str)>,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, DomainError>;
}

/// Real HTTP client using reqwest
///
/// Every failure is reported as an upstream error of `service`.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    service: &'static str,
}

impl HttpClient {
    pub fn new(service: &'static str) -> Self {
        Self {
            client: reqwest::Client::new(),
            service,
        }
    }

    pub fn with_timeout(service: &'static str, timeout: Duration) -> Result<Self, DomainError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                DomainError::configuration(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self { client, service })
    }
}

#[async_trait]
impl HttpClientTrait for HttpClient {
    async fn post_json(
        &self,
        url: &str,
        headers: Vec<(&str, &str)>,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, DomainError> {
        let mut request = self.client.post(url);

        for (key, value) in headers {
            request = request.header(key, value);
        }

        let response = request.json(body).send().await.map_err(|e| {
            DomainError::upstream(self.service, format!("Request failed: {}", e))
        })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(DomainError::upstream(self.service, "Rate limit exceeded"));
        }

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(DomainError::upstream(
                self.service,
                format!("HTTP {}: {}", status, error_body),
            ));
        }

        let text = response.text().await.map_err(|e| {
            DomainError::upstream(self.service, format!("Failed to read response: {}", e))
        })?;

        if text.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }

        serde_json::from_str(&text).map_err(|e| {
            DomainError::upstream(self.service, format!("Failed to parse response: {}", e))
        })
    }
}
