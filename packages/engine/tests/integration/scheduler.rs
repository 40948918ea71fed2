use chrono::Utc;
use common::InstanceStatus;
use sea_orm::{ActiveModelTrait, IntoActiveModel, Set};

use engine::config::SchedulerConfig;
use engine::entity::plugin_instance_lock;
use engine::lock;
use engine::scheduler::{TickSummary, tick};

use crate::common::{HOLDER, TestEngine};

fn config() -> SchedulerConfig {
    SchedulerConfig {
        holder: HOLDER.into(),
        stale_lock_timeout_secs: 60,
        ..Default::default()
    }
}

#[tokio::test]
async fn schedules_waiting_instances_oldest_first() {
    let mut app = TestEngine::spawn().await;
    let plugin = app.fs_plugin().await;
    let first = app.create_fs_instance(plugin.id).await;
    let second = app.create_fs_instance(plugin.id).await;

    let summary = tick(&app.engine, &config()).await.unwrap();

    assert_eq!(
        summary,
        TickSummary {
            scheduled: 2,
            ..Default::default()
        }
    );
    assert_eq!(app.jobs.recv().await.unwrap().instance_id, first.id);
    assert_eq!(app.jobs.recv().await.unwrap().instance_id, second.id);
    for id in [first.id, second.id] {
        assert_eq!(
            app.engine.instance(id).await.unwrap().status,
            InstanceStatus::Scheduled
        );
    }
}

#[tokio::test]
async fn locked_instance_is_deferred() {
    let app = TestEngine::spawn().await;
    let plugin = app.fs_plugin().await;
    let locked = app.create_fs_instance(plugin.id).await;
    let free = app.create_fs_instance(plugin.id).await;
    lock::acquire(&app.db, locked.id, "other-engine").await.unwrap();

    let summary = tick(&app.engine, &config()).await.unwrap();

    assert_eq!(summary.scheduled, 1);
    assert_eq!(summary.deferred, 1);
    assert_eq!(
        app.engine.instance(locked.id).await.unwrap().status,
        InstanceStatus::Waiting
    );
    assert_eq!(
        app.engine.instance(free.id).await.unwrap().status,
        InstanceStatus::Scheduled
    );
}

#[tokio::test]
async fn stale_lock_is_reaped_before_scheduling() {
    let app = TestEngine::spawn().await;
    let plugin = app.fs_plugin().await;
    let instance = app.create_fs_instance(plugin.id).await;
    plugin_instance_lock::ActiveModel {
        plugin_inst_id: Set(instance.id),
        holder: Set("crashed-engine".into()),
        token: Set("crashed-token".into()),
        acquired_at: Set(Utc::now() - chrono::Duration::minutes(5)),
        ..Default::default()
    }
    .insert(&app.db)
    .await
    .unwrap();

    let summary = tick(&app.engine, &config()).await.unwrap();

    assert_eq!(summary.reaped_locks, 1);
    assert_eq!(summary.scheduled, 1);
    assert!(!lock::is_locked(&app.db, instance.id).await.unwrap());
}

#[tokio::test]
async fn resumes_pending_registration() {
    let mut app = TestEngine::spawn().await;
    let plugin = app.fs_plugin().await;
    let instance = app.create_fs_instance(plugin.id).await;
    app.engine.schedule(instance.id).await.unwrap();
    app.jobs.recv().await.unwrap();
    app.engine.mark_started(instance.id).await.unwrap();

    // An exit whose registration step lost the lock race.
    let mut active = app
        .engine
        .instance(instance.id)
        .await
        .unwrap()
        .into_active_model();
    active.status = Set(InstanceStatus::RegisteringFiles);
    active.update(&app.db).await.unwrap();
    app.write_outputs(&instance, &[("report.html", "<html/>")]);

    let summary = tick(&app.engine, &config()).await.unwrap();

    assert_eq!(summary.registered, 1);
    let finished = app.engine.instance(instance.id).await.unwrap();
    assert_eq!(finished.status, InstanceStatus::FinishedSuccessfully);
    assert_eq!(finished.size, 7);
}

#[tokio::test]
async fn batch_size_limits_a_tick() {
    let app = TestEngine::spawn().await;
    let plugin = app.fs_plugin().await;
    for _ in 0..3 {
        app.create_fs_instance(plugin.id).await;
    }

    let summary = tick(
        &app.engine,
        &SchedulerConfig {
            batch_size: 2,
            ..config()
        },
    )
    .await
    .unwrap();

    assert_eq!(summary.scheduled, 2);
    let summary = tick(&app.engine, &config()).await.unwrap();
    assert_eq!(summary.scheduled, 1);
}
