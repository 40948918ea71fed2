use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::instance_status::InstanceStatus;
use crate::mq::Message;

pub const STATUS_TOPIC: &str = "instance_status";

/// Published when an instance enters a notified status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub event_id: String,
    pub instance_id: i32,
    pub feed_id: i32,
    pub status: InstanceStatus,
    #[serde(default)]
    pub error_code: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl StatusEvent {
    pub fn new(instance_id: i32, feed_id: i32, status: InstanceStatus) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            instance_id,
            feed_id,
            status,
            error_code: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_error_code(mut self, code: Option<String>) -> Self {
        self.error_code = code;
        self
    }
}

impl Message for StatusEvent {
    fn message_type() -> &'static str {
        STATUS_TOPIC
    }

    fn message_id(&self) -> &str {
        &self.event_id
    }
}
