use std::time::Duration;

use chrono::Utc;
use common::InstanceStatus;
use sea_orm::{ActiveModelTrait, Set};
use tokio::sync::oneshot;

use engine::EngineError;
use engine::entity::plugin_instance_lock;
use engine::lock::{self, with_lock};

use crate::common::TestEngine;

async fn insert_lock(app: &TestEngine, instance_id: i32, age: chrono::Duration) {
    plugin_instance_lock::ActiveModel {
        plugin_inst_id: Set(instance_id),
        holder: Set("crashed-engine".into()),
        token: Set("crashed-token".into()),
        acquired_at: Set(Utc::now() - age),
        ..Default::default()
    }
    .insert(&app.db)
    .await
    .unwrap();
}

mod exclusion {
    use super::*;

    #[tokio::test]
    async fn second_holder_gets_contention() {
        let app = TestEngine::spawn().await;
        let plugin = app.fs_plugin().await;
        let instance = app.create_fs_instance(plugin.id).await;
        let id = instance.id;

        let (entered_tx, entered_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let db = app.db.clone();
        let first = tokio::spawn(async move {
            with_lock(&db, id, "first", |_| async move {
                let _ = entered_tx.send(());
                let _ = release_rx.await;
                Ok::<_, EngineError>(42)
            })
            .await
        });
        entered_rx.await.unwrap();

        let second = with_lock(&app.db, id, "second", |_| async { Ok::<_, EngineError>(0) }).await;
        assert!(matches!(
            second,
            Err(EngineError::LockContention { instance_id }) if instance_id == id
        ));
        assert!(matches!(
            app.engine.cancel(id).await,
            Err(EngineError::LockContention { .. })
        ));

        release_tx.send(()).unwrap();
        assert_eq!(first.await.unwrap().unwrap(), 42);
        assert!(!lock::is_locked(&app.db, id).await.unwrap());

        let cancelled = app.engine.cancel(id).await.unwrap();
        assert_eq!(cancelled.status, InstanceStatus::Cancelled);
    }

    #[tokio::test]
    async fn released_when_body_fails() {
        let app = TestEngine::spawn().await;
        let plugin = app.fs_plugin().await;
        let instance = app.create_fs_instance(plugin.id).await;

        let result = with_lock(&app.db, instance.id, "holder", |_| async {
            Err::<(), _>(EngineError::Validation("boom".into()))
        })
        .await;

        assert!(matches!(result, Err(EngineError::Validation(_))));
        assert!(!lock::is_locked(&app.db, instance.id).await.unwrap());
    }

    #[tokio::test]
    async fn released_when_future_is_dropped() {
        let app = TestEngine::spawn().await;
        let plugin = app.fs_plugin().await;
        let instance = app.create_fs_instance(plugin.id).await;
        let id = instance.id;

        let (entered_tx, entered_rx) = oneshot::channel();
        let db = app.db.clone();
        let task = tokio::spawn(async move {
            with_lock(&db, id, "doomed", |_| async move {
                let _ = entered_tx.send(());
                std::future::pending::<Result<(), EngineError>>().await
            })
            .await
        });
        entered_rx.await.unwrap();
        assert!(lock::is_locked(&app.db, id).await.unwrap());

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        let mut released = false;
        for _ in 0..50 {
            if !lock::is_locked(&app.db, id).await.unwrap() {
                released = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(released, "abandoned lock was never released");
    }

    #[tokio::test]
    async fn missing_instance_is_not_found() {
        let app = TestEngine::spawn().await;

        let result = with_lock(&app.db, 777, "holder", |_| async { Ok::<_, EngineError>(()) }).await;

        assert!(matches!(result, Err(EngineError::NotFound(_))));
    }
}

mod reaping {
    use super::*;

    #[tokio::test]
    async fn only_stale_locks_are_removed() {
        let app = TestEngine::spawn().await;
        let plugin = app.fs_plugin().await;
        let stale = app.create_fs_instance(plugin.id).await;
        let fresh = app.create_fs_instance(plugin.id).await;
        insert_lock(&app, stale.id, chrono::Duration::hours(1)).await;
        insert_lock(&app, fresh.id, chrono::Duration::seconds(1)).await;

        let removed = lock::reap_stale_locks(&app.db, Duration::from_secs(600))
            .await
            .unwrap();

        assert_eq!(removed, 1);
        assert!(!lock::is_locked(&app.db, stale.id).await.unwrap());
        assert!(lock::is_locked(&app.db, fresh.id).await.unwrap());
    }
}

mod ownership {
    use super::*;

    /// Holds a lock until told to finish, then reports whether it still owns it.
    fn hold(
        app: &TestEngine,
        instance_id: i32,
        holder: &'static str,
    ) -> (
        oneshot::Receiver<()>,
        oneshot::Sender<()>,
        tokio::task::JoinHandle<Result<(), EngineError>>,
    ) {
        let (entered_tx, entered_rx) = oneshot::channel();
        let (finish_tx, finish_rx) = oneshot::channel::<()>();
        let db = app.db.clone();
        let task = tokio::spawn(async move {
            let inner = db.clone();
            with_lock(&db, instance_id, holder, |held| async move {
                let _ = entered_tx.send(());
                let _ = finish_rx.await;
                lock::ensure_held(&inner, &held).await
            })
            .await
        });
        (entered_rx, finish_tx, task)
    }

    async fn reap_everything(app: &TestEngine) -> u64 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        lock::reap_stale_locks(&app.db, Duration::from_millis(1))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn reaped_holder_does_not_release_successor() {
        let app = TestEngine::spawn().await;
        let plugin = app.fs_plugin().await;
        let instance = app.create_fs_instance(plugin.id).await;
        let id = instance.id;

        let (entered, finish, first) = hold(&app, id, "engine-a");
        entered.await.unwrap();
        assert_eq!(reap_everything(&app).await, 1);

        let successor = lock::acquire(&app.db, id, "engine-b").await.unwrap();

        finish.send(()).unwrap();
        let _ = first.await.unwrap();

        assert!(lock::is_locked(&app.db, id).await.unwrap());
        let third = with_lock(&app.db, id, "engine-c", |_| async { Ok::<_, EngineError>(()) }).await;
        assert!(matches!(third, Err(EngineError::LockContention { .. })));

        lock::release(&app.db, &successor).await.unwrap();
        assert!(!lock::is_locked(&app.db, id).await.unwrap());
    }

    #[tokio::test]
    async fn reaped_holder_learns_it_lost_the_lock() {
        let app = TestEngine::spawn().await;
        let plugin = app.fs_plugin().await;
        let instance = app.create_fs_instance(plugin.id).await;
        let id = instance.id;

        let (entered, finish, first) = hold(&app, id, "engine-a");
        entered.await.unwrap();
        assert_eq!(reap_everything(&app).await, 1);
        let _successor = lock::acquire(&app.db, id, "engine-a").await.unwrap();

        finish.send(()).unwrap();
        let result = first.await.unwrap();

        assert!(matches!(
            result,
            Err(EngineError::LockLost { instance_id }) if instance_id == id
        ));
        assert!(lock::is_locked(&app.db, id).await.unwrap());
    }

    #[tokio::test]
    async fn reaped_engine_transition_is_not_written() {
        let app = TestEngine::spawn().await;
        let plugin = app.fs_plugin().await;
        let instance = app.create_fs_instance(plugin.id).await;

        let (entered, finish, first) = hold(&app, instance.id, "engine-a");
        entered.await.unwrap();
        assert_eq!(reap_everything(&app).await, 1);

        let cancelled = app.engine.cancel(instance.id).await.unwrap();
        assert_eq!(cancelled.status, InstanceStatus::Cancelled);

        finish.send(()).unwrap();
        assert!(matches!(
            first.await.unwrap(),
            Err(EngineError::LockLost { .. })
        ));
        assert!(!lock::is_locked(&app.db, instance.id).await.unwrap());
    }
}
