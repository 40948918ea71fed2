use broccoli_queue::error::BroccoliError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MqError {
    #[error("failed to connect to broker at {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("broker error: {0}")]
    Broker(String),
}

impl From<BroccoliError> for MqError {
    fn from(e: BroccoliError) -> Self {
        MqError::Broker(e.to_string())
    }
}
