use serde::{Deserialize, Serialize};

use crate::mq::Message;

/// What the execution backend observed for a job.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionEvent {
    /// The job began running.
    Started,
    /// The job exited.
    Exited {
        success: bool,
        #[serde(default)]
        summary: String,
        #[serde(default)]
        raw: String,
    },
}

/// Report published by the execution backend, consumed by the engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Job this report belongs to.
    pub job_id: String,
    pub instance_id: i32,
    pub event: ExecutionEvent,
}

impl ExecutionReport {
    pub fn started(job_id: impl Into<String>, instance_id: i32) -> Self {
        Self {
            job_id: job_id.into(),
            instance_id,
            event: ExecutionEvent::Started,
        }
    }

    pub fn exited(
        job_id: impl Into<String>,
        instance_id: i32,
        success: bool,
        summary: impl Into<String>,
        raw: impl Into<String>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            instance_id,
            event: ExecutionEvent::Exited {
                success,
                summary: summary.into(),
                raw: raw.into(),
            },
        }
    }
}

impl Message for ExecutionReport {
    fn message_type() -> &'static str {
        "execution_report"
    }

    fn message_id(&self) -> &str {
        &self.job_id
    }
}
