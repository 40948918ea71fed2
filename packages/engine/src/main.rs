use std::sync::Arc;

use anyhow::Context;
use engine::config::AppConfig;
use engine::consumers::{ReportRetry, consume_execution_reports};
use engine::dispatch::{ChannelDispatcher, JobDispatcher, MqJobDispatcher};
use engine::notify::{BroadcastNotifier, MqNotifier, Notifier};
use engine::storage::FilesystemFileIndex;
use engine::{Engine, database, registry, scheduler};
use mq::{MqConfig, init_mq};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let config = AppConfig::load().context("Failed to load config")?;
    info!(holder = %config.scheduler.holder, "Engine starting");

    let db = database::init_db(&config.database)
        .await
        .context("Failed to initialize database")?;
    database::ensure_indexes(&db)
        .await
        .context("Failed to create indexes")?;

    let registered = registry::sync_plugins_dir(&db, &config.plugin.plugins_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to register plugins from {}",
                config.plugin.plugins_dir.display()
            )
        })?;
    info!(count = registered.len(), "Plugins registered");

    let file_index = Arc::new(FilesystemFileIndex::new(config.storage.root.clone()));

    let mq = if config.mq.enabled {
        let mq = init_mq(MqConfig::from(&config.mq))
            .await
            .context("Failed to initialize MQ")?;
        info!(
            job_queue = %config.mq.job_queue,
            report_queue = %config.mq.report_queue,
            status_queue = %config.mq.status_queue,
            "MQ connected"
        );
        Some(Arc::new(mq))
    } else {
        warn!("MQ disabled, jobs stay in-process and no reports are consumed");
        None
    };

    let (notifier, dispatcher): (Arc<dyn Notifier>, Arc<dyn JobDispatcher>) = match &mq {
        Some(mq) => (
            Arc::new(MqNotifier::new(Arc::clone(mq), config.mq.status_queue.clone())),
            Arc::new(MqJobDispatcher::new(Arc::clone(mq), config.mq.job_queue.clone())),
        ),
        None => {
            let (dispatcher, mut jobs) = ChannelDispatcher::new();
            tokio::spawn(async move {
                while let Some(job) = jobs.recv().await {
                    info!(
                        instance_id = job.instance_id,
                        job_id = %job.job_id,
                        args = ?job.command_args(),
                        "Job queued in-process"
                    );
                }
            });
            (Arc::new(BroadcastNotifier::new(256)), Arc::new(dispatcher))
        }
    };

    let engine = Engine::new(
        db,
        file_index,
        notifier,
        dispatcher,
        config.scheduler.holder.clone(),
    );

    // TODO: Store handles for graceful shutdown. Tasks currently run until process exit.
    tokio::spawn(scheduler::run_scheduler(
        engine.clone(),
        config.scheduler.clone(),
    ));
    if let Some(mq) = mq {
        tokio::spawn(consume_execution_reports(
            engine.clone(),
            mq,
            config.mq.report_queue.clone(),
            ReportRetry::from(&config.scheduler),
        ));
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Engine shutting down");

    Ok(())
}
