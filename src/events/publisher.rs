use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::types::{PublishedEvent, SampleLifecycleEvent};
use crate::constants::DEFAULT_EVENT_CHANNEL_CAPACITY;
use crate::error::Result;

/// Fire-and-forget publication seam for lifecycle events
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, event: SampleLifecycleEvent) -> Result<()>;
}

/// In-process event publisher backed by a broadcast channel
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<PublishedEvent>,
}

impl EventPublisher {
    /// Create a new event publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CHANNEL_CAPACITY)
    }
}

#[async_trait]
impl EventBus for EventPublisher {
    async fn publish(&self, event: SampleLifecycleEvent) -> Result<()> {
        let name = event.name();
        let published = PublishedEvent {
            event,
            published_at: chrono::Utc::now(),
        };

        // No subscribers is fine; the event is simply dropped
        match self.sender.send(published) {
            Ok(receivers) => debug!(event = name, receivers, "Published lifecycle event"),
            Err(broadcast::error::SendError(_)) => {
                debug!(event = name, "Published lifecycle event with no subscribers")
            }
        }
        Ok(())
    }
}

/// Publish without awaiting; failures are logged and never reach the caller
pub fn dispatch_in_background(
    bus: Arc<dyn EventBus>,
    event: SampleLifecycleEvent,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let name = event.name();
        let order_id = event.oms_order_id().to_string();
        if let Err(e) = bus.publish(event).await {
            error!(event = name, order_id = %order_id, error = %e, "Failed to publish lifecycle event");
        }
    })
}

/// Publish a batch sequentially in one background task, logging each failure
pub fn dispatch_all_in_background(
    bus: Arc<dyn EventBus>,
    events: Vec<SampleLifecycleEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        for event in events {
            let name = event.name();
            let order_id = event.oms_order_id().to_string();
            if let Err(e) = bus.publish(event).await {
                error!(event = name, order_id = %order_id, error = %e, "Failed to publish lifecycle event");
            }
        }
    })
}
