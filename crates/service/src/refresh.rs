//! Invalidation fan-out. Every completed transition publishes the record it
//! touched so list views re-run the normalizer on fresh data.

use serde::Serialize;
use tokio::sync::broadcast;

use sejong_core::lifecycle::{EntityKind, LifecycleAction};
use sejong_core::status::NormalizedStatus;

const DEFAULT_CAPACITY: usize = 64;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RefreshEvent {
    pub entity: EntityKind,
    pub id: String,
    pub action: LifecycleAction,
    pub status: NormalizedStatus,
    pub correlation_id: String,
}

#[derive(Clone, Debug)]
pub struct RefreshBus {
    sender: broadcast::Sender<RefreshEvent>,
}

impl Default for RefreshBus {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl RefreshBus {
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RefreshEvent> {
        self.sender.subscribe()
    }

    /// Returns how many subscribers saw the event. Nobody listening is fine.
    pub fn publish(&self, event: RefreshEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use sejong_core::domain::catalog::ActiveStatus;
    use sejong_core::lifecycle::{EntityKind, LifecycleAction};
    use sejong_core::status::{normalize, RecordRef};
    use sejong_core::Institute;

    use super::{RefreshBus, RefreshEvent};

    fn event() -> RefreshEvent {
        let institute = Institute {
            id: "i-1".to_string(),
            name: "세종학당 하노이".to_string(),
            field: None,
            address: None,
            contact: None,
            status: ActiveStatus::Inactive,
        };
        RefreshEvent {
            entity: EntityKind::Institute,
            id: institute.id.clone(),
            action: LifecycleAction::Deactivate,
            status: normalize(RecordRef::Institute(&institute)),
            correlation_id: "corr-1".to_string(),
        }
    }

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = RefreshBus::default();
        let mut receiver = bus.subscribe();

        assert_eq!(bus.publish(event()), 1);
        let received = receiver.recv().await.expect("event");
        assert_eq!(received.status.display_status, "비활성");
    }

    #[test]
    fn publishing_without_subscribers_is_not_an_error() {
        assert_eq!(RefreshBus::default().publish(event()), 0);
    }
}
