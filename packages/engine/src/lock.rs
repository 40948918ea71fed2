use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set,
    SqlErr,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::entity::{plugin_instance, plugin_instance_lock};
use crate::error::EngineError;

/// Run `body` while holding the lock row of `instance_id`.
///
/// Acquisition never waits: if another actor holds the row the call fails
/// with [`EngineError::LockContention`] and `body` does not run. `body`
/// receives the acquired row so writes can confirm it is still held. Only
/// that row is removed on exit, so a holder whose row was reaped cannot
/// release a successor. If the returned future is dropped mid-flight or
/// `body` panics, release happens on a spawned task.
pub async fn with_lock<T, F, Fut>(
    db: &DatabaseConnection,
    instance_id: i32,
    holder: &str,
    body: F,
) -> Result<T, EngineError>
where
    F: FnOnce(plugin_instance_lock::Model) -> Fut,
    Fut: Future<Output = Result<T, EngineError>>,
{
    let lock = acquire(db, instance_id, holder).await?;
    let mut guard = LockReleaseGuard::new(db.clone(), lock.clone());

    let result = body(lock.clone()).await;

    guard.defuse();
    if let Err(e) = release(db, &lock).await {
        error!(instance_id, error = %e, "Failed to release instance lock");
    }

    result
}

/// Insert the lock row. A uniqueness violation means someone else holds it.
pub async fn acquire(
    db: &DatabaseConnection,
    instance_id: i32,
    holder: &str,
) -> Result<plugin_instance_lock::Model, EngineError> {
    let exists = plugin_instance::Entity::find_by_id(instance_id)
        .one(db)
        .await?
        .is_some();
    if !exists {
        return Err(EngineError::instance_not_found(instance_id));
    }

    let row = plugin_instance_lock::ActiveModel {
        plugin_inst_id: Set(instance_id),
        holder: Set(holder.to_string()),
        token: Set(Uuid::new_v4().to_string()),
        acquired_at: Set(Utc::now()),
        ..Default::default()
    };

    match row.insert(db).await {
        Ok(lock) => {
            debug!(instance_id, holder, lock_id = lock.id, "Acquired instance lock");
            Ok(lock)
        }
        Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
            warn!(instance_id, holder, "Instance lock is held by another actor");
            Err(EngineError::LockContention { instance_id })
        }
        Err(e) => Err(e.into()),
    }
}

/// Delete exactly the row `lock` names. A row that was already reaped, or
/// reacquired by someone else, is left alone.
pub async fn release(
    db: &DatabaseConnection,
    lock: &plugin_instance_lock::Model,
) -> Result<(), DbErr> {
    let result = plugin_instance_lock::Entity::delete_many()
        .filter(plugin_instance_lock::Column::Id.eq(lock.id))
        .filter(plugin_instance_lock::Column::Token.eq(lock.token.as_str()))
        .exec(db)
        .await?;
    if result.rows_affected == 0 {
        warn!(
            instance_id = lock.plugin_inst_id,
            holder = %lock.holder,
            "Instance lock was gone before release"
        );
    } else {
        debug!(instance_id = lock.plugin_inst_id, "Released instance lock");
    }
    Ok(())
}

/// Fails with [`EngineError::LockLost`] when `lock` no longer exists.
pub async fn ensure_held(
    db: &DatabaseConnection,
    lock: &plugin_instance_lock::Model,
) -> Result<(), EngineError> {
    let held = plugin_instance_lock::Entity::find_by_id(lock.id)
        .filter(plugin_instance_lock::Column::Token.eq(lock.token.as_str()))
        .one(db)
        .await?
        .is_some();
    if held {
        Ok(())
    } else {
        Err(EngineError::LockLost {
            instance_id: lock.plugin_inst_id,
        })
    }
}

pub async fn is_locked(db: &DatabaseConnection, instance_id: i32) -> Result<bool, DbErr> {
    Ok(plugin_instance_lock::Entity::find()
        .filter(plugin_instance_lock::Column::PluginInstId.eq(instance_id))
        .one(db)
        .await?
        .is_some())
}

/// Delete lock rows acquired more than `older_than` ago.
pub async fn reap_stale_locks(db: &DatabaseConnection, older_than: Duration) -> Result<u64, DbErr> {
    let Some(threshold) = chrono::Duration::from_std(older_than)
        .ok()
        .and_then(|age| Utc::now().checked_sub_signed(age))
    else {
        return Ok(0);
    };

    let result = plugin_instance_lock::Entity::delete_many()
        .filter(plugin_instance_lock::Column::AcquiredAt.lt(threshold))
        .exec(db)
        .await?;

    if result.rows_affected > 0 {
        info!(removed = result.rows_affected, "Reaped stale instance locks");
    }
    Ok(result.rows_affected)
}

/// Releases the lock from a spawned task unless defused.
struct LockReleaseGuard {
    db: DatabaseConnection,
    lock: plugin_instance_lock::Model,
    defused: bool,
}

impl LockReleaseGuard {
    fn new(db: DatabaseConnection, lock: plugin_instance_lock::Model) -> Self {
        Self {
            db,
            lock,
            defused: false,
        }
    }

    fn defuse(&mut self) {
        self.defused = true;
    }
}

impl Drop for LockReleaseGuard {
    fn drop(&mut self) {
        if self.defused {
            return;
        }
        let db = self.db.clone();
        let lock = self.lock.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = release(&db, &lock).await {
                        error!(
                            instance_id = lock.plugin_inst_id,
                            error = %e,
                            "Failed to release abandoned instance lock"
                        );
                    }
                });
            }
            Err(_) => warn!(
                instance_id = self.lock.plugin_inst_id,
                "No runtime to release abandoned instance lock"
            ),
        }
    }
}
