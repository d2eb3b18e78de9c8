//! Webhook delivery with exponential-backoff retry.
//!
//! [`WebhookDelivery`] POSTs a JSON-encoded [`PlatformEvent`] to an external
//! URL. A failed attempt is retried after each configured delay (1 s, 2 s,
//! 4 s by default), so the default policy makes four attempts in total.

use std::time::Duration;

use crate::bus::PlatformEvent;

/// Retry delays in seconds (exponential backoff: 1s, 2s, 4s).
const RETRY_DELAYS_SECS: [u64; 3] = [1, 2, 4];

/// HTTP request timeout for a single delivery attempt.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// Network, DNS, timeout or client construction failure.
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The remote server returned a non-2xx status code.
    #[error("Webhook returned HTTP {0}")]
    HttpStatus(u16),
}

// ---------------------------------------------------------------------------
// WebhookDelivery
// ---------------------------------------------------------------------------

/// Delivers events to external webhook endpoints.
pub struct WebhookDelivery {
    client: reqwest::Client,
    retry_delays: Vec<Duration>,
}

impl WebhookDelivery {
    /// Build a delivery service with the default timeout and backoff.
    pub fn new() -> Result<Self, WebhookError> {
        Self::with_timeout(REQUEST_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, WebhookError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            retry_delays: RETRY_DELAYS_SECS
                .iter()
                .map(|s| Duration::from_secs(*s))
                .collect(),
        })
    }

    /// Override the backoff schedule. An empty schedule means one attempt.
    pub fn with_retry_delays(mut self, delays: Vec<Duration>) -> Self {
        self.retry_delays = delays;
        self
    }

    /// The JSON body sent for an event.
    pub fn payload_for(event: &PlatformEvent) -> serde_json::Value {
        serde_json::json!({
            "event_type": event.event_type,
            "payload": event.payload,
            "timestamp": event.timestamp,
            "source_entity_type": event.source_entity_type,
            "source_entity_id": event.source_entity_id,
            "actor": event.actor,
        })
    }

    /// Deliver an event to `url`, retrying on failure.
    ///
    /// Returns `Ok(())` on the first successful attempt, or the last error
    /// once every retry is exhausted.
    pub async fn deliver(&self, url: &str, event: &PlatformEvent) -> Result<(), WebhookError> {
        let payload = Self::payload_for(event);

        for (attempt, delay) in self.retry_delays.iter().enumerate() {
            match self.try_send(url, &payload).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        url,
                        event_type = %event.event_type,
                        error = %e,
                        "Webhook delivery attempt failed, retrying"
                    );
                    tokio::time::sleep(*delay).await;
                }
            }
        }

        // Final attempt after the last backoff.
        self.try_send(url, &payload).await.inspect_err(|e| {
            tracing::error!(
                url,
                event_type = %event.event_type,
                error = %e,
                "Webhook delivery failed after all retries"
            );
        })
    }

    async fn try_send(&self, url: &str, payload: &serde_json::Value) -> Result<(), WebhookError> {
        let response = self.client.post(url).json(payload).send().await?;
        if !response.status().is_success() {
            return Err(WebhookError::HttpStatus(response.status().as_u16()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::PROPOSAL_REJECTED;
    use tribunal_core::types::new_id;

    #[test]
    fn test_new_builds_default_schedule() {
        let delivery = WebhookDelivery::new().unwrap();
        assert_eq!(delivery.retry_delays.len(), 3);
        assert_eq!(delivery.retry_delays[2], Duration::from_secs(4));
    }

    #[test]
    fn test_webhook_error_display_http_status() {
        let err = WebhookError::HttpStatus(502);
        assert_eq!(err.to_string(), "Webhook returned HTTP 502");
    }

    #[test]
    fn test_payload_carries_source_and_actor() {
        let id = new_id();
        let event = PlatformEvent::proposal(PROPOSAL_REJECTED, id)
            .with_actor("nihilus@tribunal.dev")
            .with_payload(serde_json::json!({"reason": "Contenido incompleto"}));

        let body = WebhookDelivery::payload_for(&event);
        assert_eq!(body["event_type"], PROPOSAL_REJECTED);
        assert_eq!(body["source_entity_type"], "proposal");
        assert_eq!(body["source_entity_id"], id.to_string());
        assert_eq!(body["actor"], "nihilus@tribunal.dev");
        assert_eq!(body["payload"]["reason"], "Contenido incompleto");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_fails_without_retries() {
        let delivery = WebhookDelivery::with_timeout(Duration::from_millis(500))
            .unwrap()
            .with_retry_delays(Vec::new());
        let result = delivery
            .deliver("http://127.0.0.1:9/hook", &PlatformEvent::new(PROPOSAL_REJECTED))
            .await;
        assert!(matches!(result, Err(WebhookError::Request(_))));
    }
}
