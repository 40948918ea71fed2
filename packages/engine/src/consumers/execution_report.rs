use std::sync::Arc;

use common::InstanceStatus;
use common::execution_report::{ExecutionEvent, ExecutionReport};
use common::retry::Backoff;
use mq::{BroccoliError, BrokerMessage, Mq};
use tracing::{error, info, warn};

use crate::config::SchedulerConfig;
use crate::engine::Engine;
use crate::error::EngineError;

/// Backoff applied when a report hits a locked instance.
#[derive(Debug, Clone, Copy)]
pub struct ReportRetry {
    pub max_attempts: u8,
    pub backoff: Backoff,
}

impl From<&SchedulerConfig> for ReportRetry {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            max_attempts: config.report_max_attempts,
            backoff: Backoff::from_millis(
                config.report_backoff_base_ms,
                config.report_backoff_max_ms,
            ),
        }
    }
}

/// Consume execution reports from the report queue.
pub async fn consume_execution_reports(
    engine: Engine,
    mq: Arc<Mq>,
    queue_name: String,
    retry: ReportRetry,
) {
    info!(queue = %queue_name, "Starting execution report consumer");

    let result = mq
        .process_messages(
            &queue_name,
            None,
            None,
            move |message: BrokerMessage<ExecutionReport>| {
                let engine = engine.clone();
                async move {
                    let report = message.payload;
                    if let Err(e) = handle_report(&engine, &report, retry).await {
                        error!(
                            instance_id = report.instance_id,
                            job_id = %report.job_id,
                            error = %e,
                            "Failed to process execution report"
                        );
                        return Err(BroccoliError::Job(e.to_string()));
                    }
                    Ok(())
                }
            },
        )
        .await;

    if let Err(e) = result {
        error!(error = %e, "Execution report consumer stopped unexpectedly");
    }
}

/// Apply one report, retrying lock contention with backoff.
///
/// Reports for deleted instances, and conflicting reports whose instance has
/// already moved past the report's target status, are acknowledged and
/// dropped. Any other conflict is returned so the broker redelivers it.
pub async fn handle_report(
    engine: &Engine,
    report: &ExecutionReport,
    retry: ReportRetry,
) -> Result<(), EngineError> {
    let mut attempt: u8 = 0;
    loop {
        match engine.ingest_report(report).await {
            Ok(instance) => {
                info!(
                    instance_id = instance.id,
                    job_id = %report.job_id,
                    status = %instance.status,
                    "Processed execution report"
                );
                return Ok(());
            }
            Err(e) if e.is_retryable() && attempt + 1 < retry.max_attempts => {
                attempt += 1;
                let delay = retry.backoff.delay(attempt);
                warn!(
                    instance_id = report.instance_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Instance locked, retrying report"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e @ EngineError::NotFound(_)) => {
                warn!(
                    instance_id = report.instance_id,
                    job_id = %report.job_id,
                    error = %e,
                    "Dropping execution report for missing instance"
                );
                return Ok(());
            }
            Err(e @ EngineError::StateConflict(_)) => {
                if !is_superseded(engine, report).await? {
                    return Err(e);
                }
                warn!(
                    instance_id = report.instance_id,
                    job_id = %report.job_id,
                    error = %e,
                    "Dropping stale execution report"
                );
                return Ok(());
            }
            Err(e) => return Err(e),
        }
    }
}

/// Status an instance reaches once `event` has been applied.
fn target_status(event: &ExecutionEvent) -> InstanceStatus {
    match event {
        ExecutionEvent::Started => InstanceStatus::Started,
        ExecutionEvent::Exited { .. } => InstanceStatus::RegisteringFiles,
    }
}

/// True when the instance is gone or already at or past the report's target.
async fn is_superseded(engine: &Engine, report: &ExecutionReport) -> Result<bool, EngineError> {
    match engine.instance(report.instance_id).await {
        Ok(instance) => Ok(instance.status.rank() >= target_status(&report.event).rank()),
        Err(EngineError::NotFound(_)) => Ok(true),
        Err(e) => Err(e),
    }
}
