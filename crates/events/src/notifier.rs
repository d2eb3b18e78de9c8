//! Fans proposal and integration events out to configured webhooks.
//!
//! [`WebhookNotifier`] subscribes to the bus and spawns one delivery per
//! (event, url) pair so a slow endpoint never stalls the receive loop.
//! On shutdown it stops receiving and waits for in-flight deliveries.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::bus::PlatformEvent;
use crate::delivery::webhook::WebhookDelivery;

/// Event name prefixes forwarded to webhooks.
const FORWARDED_PREFIXES: [&str; 2] = ["proposal.", "integration."];

pub struct WebhookNotifier {
    delivery: Arc<WebhookDelivery>,
    urls: Arc<[String]>,
    tracker: TaskTracker,
}

impl WebhookNotifier {
    pub fn new(delivery: WebhookDelivery, urls: Vec<String>) -> Self {
        Self {
            delivery: Arc::new(delivery),
            urls: urls.into(),
            tracker: TaskTracker::new(),
        }
    }

    pub fn should_forward(event_type: &str) -> bool {
        FORWARDED_PREFIXES.iter().any(|p| event_type.starts_with(p))
    }

    /// Run until the bus closes or `cancel` fires.
    pub async fn run(
        self,
        mut receiver: broadcast::Receiver<PlatformEvent>,
        cancel: CancellationToken,
    ) {
        tracing::info!(endpoints = self.urls.len(), "Webhook notifier started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Webhook notifier cancelled");
                    break;
                }
                received = receiver.recv() => match received {
                    Ok(event) => self.dispatch(event),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "Webhook notifier lagged, events were dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("Event bus closed, webhook notifier shutting down");
                        break;
                    }
                },
            }
        }

        self.tracker.close();
        self.tracker.wait().await;
    }

    fn dispatch(&self, event: PlatformEvent) {
        if self.urls.is_empty() || !Self::should_forward(&event.event_type) {
            return;
        }
        let event = Arc::new(event);
        for url in self.urls.iter() {
            let delivery = Arc::clone(&self.delivery);
            let event = Arc::clone(&event);
            let url = url.clone();
            self.tracker.spawn(async move {
                if delivery.deliver(&url, &event).await.is_ok() {
                    tracing::debug!(url, event_type = %event.event_type, "Webhook delivered");
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::bus::{EventBus, PROPOSAL_APPROVED};

    #[test]
    fn test_only_domain_events_are_forwarded() {
        assert!(WebhookNotifier::should_forward("proposal.approved"));
        assert!(WebhookNotifier::should_forward("integration.failed"));
        assert!(!WebhookNotifier::should_forward("system.startup"));
    }

    #[tokio::test]
    async fn test_exits_when_bus_is_dropped() {
        let bus = EventBus::default();
        let notifier = WebhookNotifier::new(WebhookDelivery::new().unwrap(), Vec::new());
        let handle = tokio::spawn(notifier.run(bus.subscribe(), CancellationToken::new()));

        bus.publish(PlatformEvent::new(PROPOSAL_APPROVED));
        drop(bus);

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("notifier should stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_waits_for_in_flight_deliveries_on_cancel() {
        let bus = EventBus::default();
        let delivery = WebhookDelivery::with_timeout(Duration::from_millis(200))
            .unwrap()
            .with_retry_delays(Vec::new());
        let notifier = WebhookNotifier::new(delivery, vec!["http://127.0.0.1:9/hook".into()]);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(notifier.run(bus.subscribe(), cancel.clone()));

        bus.publish(PlatformEvent::new(PROPOSAL_APPROVED));
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("notifier should drain and stop")
            .unwrap();
    }
}
