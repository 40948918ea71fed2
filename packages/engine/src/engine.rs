use std::sync::Arc;

use common::event::StatusEvent;
use sea_orm::{DatabaseConnection, EntityTrait};
use tracing::warn;

use crate::dispatch::JobDispatcher;
use crate::entity::plugin_instance;
use crate::error::EngineError;
use crate::notify::Notifier;
use crate::storage::FileIndex;

/// Handle to the engine: the database plus its three collaborators.
///
/// Cheap to clone; every clone shares the same connection pool.
#[derive(Clone)]
pub struct Engine {
    db: DatabaseConnection,
    file_index: Arc<dyn FileIndex>,
    notifier: Arc<dyn Notifier>,
    dispatcher: Arc<dyn JobDispatcher>,
    holder: String,
}

impl Engine {
    pub fn new(
        db: DatabaseConnection,
        file_index: Arc<dyn FileIndex>,
        notifier: Arc<dyn Notifier>,
        dispatcher: Arc<dyn JobDispatcher>,
        holder: impl Into<String>,
    ) -> Self {
        Self {
            db,
            file_index,
            notifier,
            dispatcher,
            holder: holder.into(),
        }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Identity recorded in the lock rows this engine writes.
    pub fn holder(&self) -> &str {
        &self.holder
    }

    pub(crate) fn file_index(&self) -> &dyn FileIndex {
        self.file_index.as_ref()
    }

    pub(crate) fn dispatcher(&self) -> &dyn JobDispatcher {
        self.dispatcher.as_ref()
    }

    pub async fn instance(&self, instance_id: i32) -> Result<plugin_instance::Model, EngineError> {
        plugin_instance::Entity::find_by_id(instance_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| EngineError::instance_not_found(instance_id))
    }

    /// Best-effort: failures are logged and dropped.
    pub(crate) async fn notify(&self, instance: &plugin_instance::Model) {
        let event = StatusEvent::new(instance.id, instance.feed_id, instance.status)
            .with_error_code(instance.error_code.clone());
        if let Err(e) = self.notifier.notify(&event).await {
            warn!(
                instance_id = instance.id,
                status = %instance.status,
                error = %e,
                "Failed to send status notification"
            );
        }
    }
}
