use std::time::Duration;

use common::InstanceStatus;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect};
use tracing::{error, info, warn};

use crate::config::SchedulerConfig;
use crate::engine::Engine;
use crate::entity::plugin_instance;
use crate::error::EngineError;
use crate::lock::reap_stale_locks;

/// What one scheduler pass did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickSummary {
    pub reaped_locks: u64,
    pub scheduled: usize,
    pub registered: usize,
    /// Instances left for the next tick, lock contention included.
    pub deferred: usize,
}

/// Run the scheduler as a background task.
pub async fn run_scheduler(engine: Engine, config: SchedulerConfig) {
    info!(
        holder = %config.holder,
        tick_interval_ms = config.tick_interval_ms,
        batch_size = config.batch_size,
        "Starting scheduler"
    );

    let mut interval = tokio::time::interval(Duration::from_millis(config.tick_interval_ms));

    loop {
        interval.tick().await;

        if let Err(e) = tick(&engine, &config).await {
            error!(error = %e, "Scheduler tick failed");
        }
    }
}

/// One pass: reap stale locks, schedule waiting instances oldest first, then
/// resume output registration that an earlier report could not finish.
pub async fn tick(engine: &Engine, config: &SchedulerConfig) -> Result<TickSummary, EngineError> {
    let mut summary = TickSummary {
        reaped_locks: reap_stale_locks(
            engine.db(),
            Duration::from_secs(config.stale_lock_timeout_secs),
        )
        .await?,
        ..Default::default()
    };

    for instance_id in ids_in(engine, InstanceStatus::Waiting, config.batch_size).await? {
        match engine.schedule(instance_id).await {
            Ok(_) => summary.scheduled += 1,
            Err(e) => {
                summary.deferred += 1;
                log_deferred(instance_id, "schedule", &e);
            }
        }
    }

    for instance_id in ids_in(engine, InstanceStatus::RegisteringFiles, config.batch_size).await? {
        match engine.register_files(instance_id).await {
            Ok(_) => summary.registered += 1,
            Err(e) => {
                summary.deferred += 1;
                log_deferred(instance_id, "register files", &e);
            }
        }
    }

    Ok(summary)
}

async fn ids_in(
    engine: &Engine,
    status: InstanceStatus,
    limit: u64,
) -> Result<Vec<i32>, EngineError> {
    Ok(plugin_instance::Entity::find()
        .select_only()
        .column(plugin_instance::Column::Id)
        .filter(plugin_instance::Column::Status.eq(status))
        .order_by_asc(plugin_instance::Column::StartDate)
        .order_by_asc(plugin_instance::Column::Id)
        .limit(limit)
        .into_tuple()
        .all(engine.db())
        .await?)
}

fn log_deferred(instance_id: i32, step: &str, err: &EngineError) {
    if err.is_retryable() {
        warn!(instance_id, step, "Instance locked, retrying next tick");
    } else {
        error!(instance_id, step, error = %err, "Scheduler step failed");
    }
}
