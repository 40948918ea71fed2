use std::sync::Arc;

use async_trait::async_trait;
use common::event::StatusEvent;
use mq::{Mq, publish_message};
use tokio::sync::broadcast;

/// Receives status notifications. Delivery is best-effort.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &StatusEvent) -> anyhow::Result<()>;
}

/// In-process fan-out over a tokio broadcast channel.
#[derive(Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<StatusEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl Notifier for BroadcastNotifier {
    async fn notify(&self, event: &StatusEvent) -> anyhow::Result<()> {
        // Having no subscriber is not a failure.
        let _ = self.tx.send(event.clone());
        Ok(())
    }
}

/// Publishes status events to a queue.
pub struct MqNotifier {
    mq: Arc<Mq>,
    queue: String,
}

impl MqNotifier {
    pub fn new(mq: Arc<Mq>, queue: impl Into<String>) -> Self {
        Self {
            mq,
            queue: queue.into(),
        }
    }
}

#[async_trait]
impl Notifier for MqNotifier {
    async fn notify(&self, event: &StatusEvent) -> anyhow::Result<()> {
        publish_message(&self.mq, &self.queue, event).await?;
        Ok(())
    }
}
