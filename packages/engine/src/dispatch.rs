use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use common::plugin_job::PluginJob;
use mq::{Mq, publish_message};
use tokio::sync::mpsc;

/// Hands jobs to the execution backend.
#[async_trait]
pub trait JobDispatcher: Send + Sync {
    async fn dispatch(&self, job: &PluginJob) -> anyhow::Result<()>;
}

pub struct MqJobDispatcher {
    mq: Arc<Mq>,
    queue: String,
}

impl MqJobDispatcher {
    pub fn new(mq: Arc<Mq>, queue: impl Into<String>) -> Self {
        Self {
            mq,
            queue: queue.into(),
        }
    }
}

#[async_trait]
impl JobDispatcher for MqJobDispatcher {
    async fn dispatch(&self, job: &PluginJob) -> anyhow::Result<()> {
        publish_message(&self.mq, &self.queue, job).await?;
        Ok(())
    }
}

/// Dispatches into an in-process channel, for backends running in the same process.
#[derive(Clone)]
pub struct ChannelDispatcher {
    tx: mpsc::UnboundedSender<PluginJob>,
}

impl ChannelDispatcher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PluginJob>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl JobDispatcher for ChannelDispatcher {
    async fn dispatch(&self, job: &PluginJob) -> anyhow::Result<()> {
        self.tx
            .send(job.clone())
            .map_err(|_| anyhow!("execution backend channel is closed"))
    }
}
