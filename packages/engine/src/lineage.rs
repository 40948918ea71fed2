use std::collections::{HashSet, VecDeque};

use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use tracing::info;

use crate::engine::Engine;
use crate::entity::{
    parameter_binding, plugin_instance, plugin_instance_lock, plugin_instance_split,
};
use crate::error::EngineError;

impl Engine {
    /// Instances whose `previous` is `instance_id`, oldest first.
    pub async fn next(&self, instance_id: i32) -> Result<Vec<plugin_instance::Model>, EngineError> {
        children_of(self.db(), instance_id).await
    }

    /// Walk `previous` links from the nearest ancestor to the root.
    pub async fn ancestors(
        &self,
        instance_id: i32,
    ) -> Result<Vec<plugin_instance::Model>, EngineError> {
        let start = self.instance(instance_id).await?;
        let mut seen = HashSet::from([start.id]);
        let mut out = Vec::new();
        let mut cursor = start.previous_id;

        while let Some(id) = cursor {
            if !seen.insert(id) {
                return Err(EngineError::StateConflict(format!(
                    "lineage of instance {instance_id} contains a cycle at {id}"
                )));
            }
            let Some(previous) = plugin_instance::Entity::find_by_id(id).one(self.db()).await?
            else {
                break;
            };
            cursor = previous.previous_id;
            out.push(previous);
        }

        Ok(out)
    }

    /// Every transitive child, breadth first.
    pub async fn descendants(
        &self,
        instance_id: i32,
    ) -> Result<Vec<plugin_instance::Model>, EngineError> {
        self.instance(instance_id).await?;
        descendants_of(self.db(), instance_id).await
    }

    /// Split records of an instance, newest first.
    pub async fn splits(
        &self,
        instance_id: i32,
    ) -> Result<Vec<plugin_instance_split::Model>, EngineError> {
        Ok(plugin_instance_split::Entity::find()
            .filter(plugin_instance_split::Column::PluginInstId.eq(instance_id))
            .order_by_desc(plugin_instance_split::Column::CreationDate)
            .order_by_desc(plugin_instance_split::Column::Id)
            .all(self.db())
            .await?)
    }

    /// Delete an instance. Descendants block the deletion unless `cascade`
    /// is set, in which case they go first. Locked instances are never deleted.
    ///
    /// Returns the ids removed, leaves first.
    pub async fn delete_instance(
        &self,
        instance_id: i32,
        cascade: bool,
    ) -> Result<Vec<i32>, EngineError> {
        self.instance(instance_id).await?;
        let descendants = descendants_of(self.db(), instance_id).await?;
        if !descendants.is_empty() && !cascade {
            return Err(EngineError::StateConflict(format!(
                "instance {instance_id} has {} descendant(s)",
                descendants.len()
            )));
        }

        let mut doomed: Vec<i32> = descendants.iter().rev().map(|d| d.id).collect();
        doomed.push(instance_id);

        let txn = self.db().begin().await?;
        let locked = plugin_instance_lock::Entity::find()
            .filter(plugin_instance_lock::Column::PluginInstId.is_in(doomed.clone()))
            .one(&txn)
            .await?;
        if let Some(lock) = locked {
            txn.rollback().await?;
            return Err(EngineError::LockContention {
                instance_id: lock.plugin_inst_id,
            });
        }

        for id in &doomed {
            parameter_binding::Entity::delete_many()
                .filter(parameter_binding::Column::PluginInstId.eq(*id))
                .exec(&txn)
                .await?;
            plugin_instance_split::Entity::delete_many()
                .filter(plugin_instance_split::Column::PluginInstId.eq(*id))
                .exec(&txn)
                .await?;
            plugin_instance::Entity::delete_by_id(*id).exec(&txn).await?;
        }
        txn.commit().await?;

        info!(instance_id, removed = doomed.len(), "Deleted plugin instance");
        Ok(doomed)
    }
}

async fn children_of<C: ConnectionTrait>(
    conn: &C,
    instance_id: i32,
) -> Result<Vec<plugin_instance::Model>, EngineError> {
    Ok(plugin_instance::Entity::find()
        .filter(plugin_instance::Column::PreviousId.eq(instance_id))
        .order_by_asc(plugin_instance::Column::Id)
        .all(conn)
        .await?)
}

async fn descendants_of<C: ConnectionTrait>(
    conn: &C,
    instance_id: i32,
) -> Result<Vec<plugin_instance::Model>, EngineError> {
    let mut seen = HashSet::from([instance_id]);
    let mut queue = VecDeque::from([instance_id]);
    let mut out = Vec::new();

    while let Some(id) = queue.pop_front() {
        for child in children_of(conn, id).await? {
            if seen.insert(child.id) {
                queue.push_back(child.id);
                out.push(child);
            }
        }
    }

    Ok(out)
}
