/// Alert fan-out boundary
///
/// The pipeline hands persisted alerts to an `AlertNotifier`; the
/// in-process broadcast bus is the default collaborator and whatever
/// chat transports exist subscribe to it. Notification failures are
/// reported per channel and never affect the already-committed write.

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use crate::types::Alert;

/// Per-channel delivery report for one alert
#[derive(Debug, Clone)]
pub struct NotificationOutcome {
    pub per_channel: Vec<(String, bool)>,
    pub any_success: bool,
}

impl NotificationOutcome {
    pub fn single(channel: &str, success: bool) -> Self {
        Self {
            per_channel: vec![(channel.to_string(), success)],
            any_success: success,
        }
    }
}

#[async_trait]
pub trait AlertNotifier: Send + Sync {
    async fn send(&self, alert: &Alert) -> NotificationOutcome;
}

/// Broadcast bus for persisted alerts
#[derive(Debug, Clone)]
pub struct AlertBus {
    tx: broadcast::Sender<Alert>,
}

impl AlertBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1000);
        debug!("AlertBus initialized with capacity: 1000");
        Self { tx }
    }

    #[instrument(skip(self, alert), fields(alert_id = %alert.id))]
    pub fn publish(&self, alert: Alert) -> Result<usize, broadcast::error::SendError<Alert>> {
        let classification = alert.score.classification;
        match self.tx.send(alert) {
            Ok(subscriber_count) => {
                info!(
                    classification = classification.as_str(),
                    subscriber_count, "Published alert"
                );
                Ok(subscriber_count)
            }
            Err(err) => {
                warn!(
                    classification = classification.as_str(),
                    "Failed to publish alert: no subscribers"
                );
                Err(err)
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Alert> {
        debug!("New subscriber added to alert bus");
        self.tx.subscribe()
    }
}

impl Default for AlertBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Default notifier: publish onto the bus for transport subscribers
pub struct BusNotifier {
    bus: AlertBus,
}

impl BusNotifier {
    pub fn new(bus: AlertBus) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl AlertNotifier for BusNotifier {
    async fn send(&self, alert: &Alert) -> NotificationOutcome {
        let delivered = self.bus.publish(alert.clone()).is_ok();
        NotificationOutcome::single("bus", delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::alerts::tests::sample_alert;

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let bus = AlertBus::new();
        let mut rx = bus.subscribe();
        let alert = sample_alert("t1", &"a".repeat(40), "m1");
        bus.publish(alert.clone()).unwrap();
        let received = rx.recv().await.unwrap();
        assert_eq!(received.id, alert.id);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_fails_soft() {
        let bus = AlertBus::new();
        let alert = sample_alert("t1", &"a".repeat(40), "m1");
        assert!(bus.publish(alert).is_err());
    }

    #[tokio::test]
    async fn test_bus_notifier_outcome() {
        let bus = AlertBus::new();
        let _rx = bus.subscribe();
        let notifier = BusNotifier::new(bus);
        let outcome = notifier.send(&sample_alert("t1", &"a".repeat(40), "m1")).await;
        assert!(outcome.any_success);
        assert_eq!(outcome.per_channel, vec![("bus".to_string(), true)]);
    }
}
