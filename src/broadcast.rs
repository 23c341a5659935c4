//! Cross-instance broadcast.
//!
//! A hub fans messages out to every subscriber in the process. Delivery is
//! best-effort: no acknowledgment, and a lagging subscriber loses messages.
//! Instances never receive their own publications.

use crate::models::ActivityEvent;
use crate::snapshot::RaffleSnapshot;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

/// Sync message kinds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum SyncMessage {
    #[serde(rename = "state-update")]
    StateUpdate { snapshot: RaffleSnapshot },
    #[serde(rename = "activity")]
    Activity { event: ActivityEvent },
}

/// A message plus routing data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Instance that published the message
    pub origin: Uuid,
    /// Relay link the message arrived through, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relayed_by: Option<Uuid>,
    pub message: SyncMessage,
}

/// In-process pub/sub hub
#[derive(Clone)]
pub struct BroadcastHub {
    tx: broadcast::Sender<Envelope>,
}

impl BroadcastHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish to all current subscribers. Returns how many received it.
    pub fn publish(&self, envelope: Envelope) -> usize {
        match self.tx.send(envelope) {
            Ok(count) => count,
            Err(_) => {
                debug!("Broadcast dropped: no subscribers");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }

    /// Channel bound to one instance identity
    pub fn channel(&self, instance_id: Uuid) -> InstanceChannel {
        InstanceChannel {
            instance_id,
            hub: self.clone(),
        }
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(1000)
    }
}

/// Publish/subscribe on behalf of one instance
#[derive(Clone)]
pub struct InstanceChannel {
    instance_id: Uuid,
    hub: BroadcastHub,
}

impl InstanceChannel {
    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn publish(&self, message: SyncMessage) -> usize {
        self.hub.publish(Envelope {
            origin: self.instance_id,
            relayed_by: None,
            message,
        })
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            instance_id: self.instance_id,
            rx: self.hub.subscribe(),
        }
    }
}

/// Inbound messages from other instances
pub struct Subscription {
    instance_id: Uuid,
    rx: broadcast::Receiver<Envelope>,
}

impl Subscription {
    /// Next message not published by this instance. `None` once the hub is gone.
    pub async fn recv(&mut self) -> Option<SyncMessage> {
        loop {
            match self.rx.recv().await {
                Ok(envelope) if envelope.origin == self.instance_id => continue,
                Ok(envelope) => return Some(envelope.message),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Subscription lagged, {} messages lost", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActivityKind, CampaignConfig, TicketNumber};

    fn activity() -> SyncMessage {
        SyncMessage::Activity {
            event: ActivityEvent::new("Ana", TicketNumber::new(1), 0, ActivityKind::Purchase),
        }
    }

    #[test]
    fn test_message_wire_shape() {
        let json = serde_json::to_value(SyncMessage::StateUpdate {
            snapshot: RaffleSnapshot::empty(CampaignConfig::default()),
        })
        .unwrap();
        assert_eq!(json["kind"], "state-update");
        assert_eq!(serde_json::to_value(activity()).unwrap()["kind"], "activity");
    }

    #[tokio::test]
    async fn test_own_messages_are_skipped() {
        let hub = BroadcastHub::new(16);
        let a = hub.channel(Uuid::new_v4());
        let b = hub.channel(Uuid::new_v4());
        let mut a_sub = a.subscribe();
        let mut b_sub = b.subscribe();

        let from_a = activity();
        let from_b = activity();
        assert_eq!(a.publish(from_a.clone()), 2);
        b.publish(from_b.clone());

        assert_eq!(a_sub.recv().await, Some(from_b));
        assert_eq!(b_sub.recv().await, Some(from_a));
    }

    #[test]
    fn test_publish_without_subscribers() {
        let hub = BroadcastHub::new(4);
        assert_eq!(hub.channel(Uuid::new_v4()).publish(activity()), 0);
    }
}
