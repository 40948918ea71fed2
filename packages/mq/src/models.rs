pub use broccoli_queue::{brokers::broker::BrokerMessage, error::BroccoliError, queue::BroccoliQueue};
use common::config::MqAppConfig;
use common::mq::Message;
use tracing::debug;

use crate::error::MqError;

pub type MqQueue = BroccoliQueue;

pub struct MqConfig {
    pub url: String,
    pub pool_size: u8,
}

impl From<&MqAppConfig> for MqConfig {
    fn from(config: &MqAppConfig) -> Self {
        Self {
            url: config.url.clone(),
            pool_size: config.pool_size,
        }
    }
}

pub async fn init_mq(config: MqConfig) -> Result<MqQueue, MqError> {
    BroccoliQueue::builder(&config.url)
        .pool_connections(config.pool_size)
        .build()
        .await
        .map_err(|e| MqError::Connect {
            url: config.url.clone(),
            reason: e.to_string(),
        })
}

/// Publish a typed message and log its identity.
pub async fn publish_message<M: Message + 'static>(
    mq: &MqQueue,
    queue: &str,
    message: &M,
) -> Result<(), MqError> {
    mq.publish(queue, None, message, None).await?;
    debug!(
        queue,
        message_type = M::message_type(),
        message_id = message.message_id(),
        "Published message"
    );
    Ok(())
}
