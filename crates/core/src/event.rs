use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use crate::model::Version;

/// Events pushed to connected clients. A closed set of variants; the wire
/// names match the push-channel protocol.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum Event {
    /// The capture queue grew or shrank.
    #[serde(rename = "queueChangeEvent")]
    QueueChange { size: usize },

    /// One captured image (and its thumbnail) was refreshed on disk.
    #[serde(rename = "updateOneScreen")]
    ScreenUpdated { name: String, env: String },

    /// A new capture round was allocated.
    #[serde(rename = "updateVersionEvent")]
    VersionList { versions: Vec<Version> },
}

/// Typed fan-out bus. Delivery is best-effort: events published with no
/// subscribers are dropped, and a lagging subscriber loses the oldest
/// entries, never the ordering.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: Event) {
        trace!(?event, "publish");
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_reach_subscribers_in_order() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        bus.publish(Event::QueueChange { size: 3 });
        bus.publish(Event::QueueChange { size: 2 });

        match rx.recv().await.unwrap() {
            Event::QueueChange { size } => assert_eq!(size, 3),
            other => panic!("unexpected event: {:?}", other),
        }
        match rx.recv().await.unwrap() {
            Event::QueueChange { size } => assert_eq!(size, 2),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let bus = EventBus::new(8);
        bus.publish(Event::ScreenUpdated {
            name: "home".into(),
            env: "prod".into(),
        });
    }

    #[test]
    fn test_wire_serialization() {
        let json = serde_json::to_value(Event::QueueChange { size: 4 }).unwrap();
        assert_eq!(json["type"], "queueChangeEvent");
        assert_eq!(json["size"], 4);

        let json = serde_json::to_value(Event::ScreenUpdated {
            name: "home".into(),
            env: "prod".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "updateOneScreen");
        assert_eq!(json["env"], "prod");
    }
}
