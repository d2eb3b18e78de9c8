//! Client for the downstream content API.
//!
//! [`ContentGateway`] is the seam the runner talks to; [`HttpContentGateway`]
//! is the production implementation over [`reqwest`].

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::compile::{ContentInjection, ContentSubmission, InjectionReceipt};

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Network, DNS, TLS or timeout failure.
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The content API returned a non-2xx status code.
    #[error("Content API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// 2xx response whose body could not be interpreted.
    #[error("Unexpected content API response: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    /// Transport failures, 5xx and 429 are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Request(_) => true,
            GatewayError::Api { status, .. } => *status >= 500 || *status == 429,
            GatewayError::InvalidResponse(_) => false,
        }
    }
}

#[async_trait]
pub trait ContentGateway: Send + Sync {
    /// Submit content; returns the id the content API assigned.
    async fn submit_content(&self, submission: &ContentSubmission) -> Result<String, GatewayError>;

    async fn inject_content(
        &self,
        injection: &ContentInjection,
    ) -> Result<InjectionReceipt, GatewayError>;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

pub struct HttpContentGateway {
    client: reqwest::Client,
    submit_url: String,
    inject_url: String,
}

impl HttpContentGateway {
    pub fn new(
        submit_url: impl Into<String>,
        inject_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            submit_url: submit_url.into(),
            inject_url: inject_url.into(),
        })
    }

    async fn post_json<T: serde::Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
    ) -> Result<Value, GatewayError> {
        let response = self.client.post(url).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(GatewayError::Api {
                status: status.as_u16(),
                body,
            });
        }
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| GatewayError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl ContentGateway for HttpContentGateway {
    async fn submit_content(&self, submission: &ContentSubmission) -> Result<String, GatewayError> {
        let body = self.post_json(&self.submit_url, submission).await?;
        content_id_of(&body).ok_or_else(|| {
            GatewayError::InvalidResponse("submission response carries no content id".to_string())
        })
    }

    async fn inject_content(
        &self,
        injection: &ContentInjection,
    ) -> Result<InjectionReceipt, GatewayError> {
        let body = self.post_json(&self.inject_url, injection).await?;
        Ok(receipt_from(body))
    }
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// Look a field up at the top level, then under a `data` envelope.
fn field<'a>(body: &'a Value, names: &[&str]) -> Option<&'a Value> {
    let scopes = [Some(body), body.get("data")];
    scopes
        .into_iter()
        .flatten()
        .find_map(|scope| names.iter().find_map(|n| scope.get(*n)))
}

/// Content ids may come back as numbers or strings.
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn content_id_of(body: &Value) -> Option<String> {
    field(body, &["contentId", "content_id", "id"]).and_then(id_string)
}

pub fn receipt_from(body: Value) -> InjectionReceipt {
    let content_id = field(&body, &["contentId", "content_id"]).and_then(id_string);
    let is_active = field(&body, &["isActive", "is_active"])
        .and_then(Value::as_bool)
        .unwrap_or(true);
    InjectionReceipt {
        content_id,
        is_active,
        raw: body,
    }
}
