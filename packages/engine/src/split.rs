use chrono::Utc;
use common::{InstanceStatus, ParameterKind, ResourceRequest};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::engine::Engine;
use crate::entity::{plugin_instance, plugin_instance_split, plugin_parameter};
use crate::error::{EngineError, SplitError};
use crate::instance::{CreateInstance, create_in};
use crate::storage::{FileGroup, SplitFilter};

/// Parameter that receives the selecting expression of each child's group.
pub const FILTER_PARAMETER: &str = "filter";

/// Fan a finished instance out into one child per file group.
#[derive(Debug, Clone, Default)]
pub struct SplitRequest {
    pub parent_id: i32,
    pub filter: String,
    /// Plugin every child runs.
    pub plugin_id: i32,
    /// Parameters shared by every child.
    pub parameters: Map<String, Value>,
    pub resources: ResourceRequest,
    /// Defaults to the owner of the parent.
    pub owner_id: Option<i32>,
    pub title: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SplitOutcome {
    pub split: plugin_instance_split::Model,
    /// In creation order, matching `split.created_plugin_inst_ids`.
    pub children: Vec<plugin_instance::Model>,
}

impl Engine {
    pub async fn split(&self, request: SplitRequest) -> Result<SplitOutcome, EngineError> {
        let filter = SplitFilter::parse(&request.filter)
            .map_err(|e| EngineError::Validation(e.to_string()))?;

        let parent = self.instance(request.parent_id).await?;
        if parent.status != InstanceStatus::FinishedSuccessfully {
            return Err(EngineError::StateConflict(format!(
                "instance {} is {}, only finishedSuccessfully instances can be split",
                parent.id, parent.status
            )));
        }

        let groups: Vec<FileGroup> = self
            .file_index()
            .evaluate_filter(&parent, &filter)
            .await?
            .into_iter()
            .filter(|group| !group.files.is_empty())
            .collect();
        if groups.is_empty() {
            return Err(SplitError::EmptyFilter {
                filter: request.filter.clone(),
            }
            .into());
        }

        let txn = self.db().begin().await.map_err(SplitError::PartialPersistFailure)?;
        let persisted = async {
            let children = create_children(&txn, &parent, &request, &groups).await?;
            let split = record_split(&txn, parent.id, filter.as_str(), &children).await?;
            Ok::<_, EngineError>((children, split))
        }
        .await;
        let (children, split) = match persisted {
            Ok(persisted) => persisted,
            Err(e) => {
                if let Err(rollback) = txn.rollback().await {
                    warn!(instance_id = parent.id, error = %rollback, "Failed to roll back split");
                }
                return Err(e);
            }
        };
        txn.commit().await.map_err(SplitError::PartialPersistFailure)?;

        info!(
            instance_id = parent.id,
            split_id = split.id,
            children = children.len(),
            "Split plugin instance"
        );
        Ok(SplitOutcome { split, children })
    }
}

/// Create one child per group on `conn`, in group order.
///
/// Database failures surface as [`SplitError::PartialPersistFailure`]; the
/// caller's transaction must then be rolled back.
pub async fn create_children<C: ConnectionTrait>(
    conn: &C,
    parent: &plugin_instance::Model,
    request: &SplitRequest,
    groups: &[FileGroup],
) -> Result<Vec<plugin_instance::Model>, EngineError> {
    let filter_param = plugin_parameter::Entity::find()
        .filter(plugin_parameter::Column::PluginId.eq(request.plugin_id))
        .filter(plugin_parameter::Column::Name.eq(FILTER_PARAMETER))
        .one(conn)
        .await
        .map_err(SplitError::PartialPersistFailure)?;
    let bind_selector = filter_param.is_some_and(|p| p.kind == ParameterKind::String)
        && !request.parameters.contains_key(FILTER_PARAMETER);

    let mut children = Vec::with_capacity(groups.len());
    for group in groups {
        let mut parameters = request.parameters.clone();
        if bind_selector && !group.selector.is_empty() {
            parameters.insert(
                FILTER_PARAMETER.to_string(),
                Value::String(group.selector.clone()),
            );
        }

        let child = create_in(
            conn,
            &CreateInstance {
                plugin_id: request.plugin_id,
                owner_id: request.owner_id.unwrap_or(parent.owner_id),
                feed_id: Some(parent.feed_id),
                previous_id: Some(parent.id),
                workflow_id: parent.workflow_id,
                title: request.title.clone(),
                parameters,
                resources: request.resources,
            },
        )
        .await
        .map_err(persist_failure)?;
        children.push(child);
    }

    Ok(children)
}

/// Write the split record listing `children` in order.
pub async fn record_split<C: ConnectionTrait>(
    conn: &C,
    parent_id: i32,
    filter: &str,
    children: &[plugin_instance::Model],
) -> Result<plugin_instance_split::Model, EngineError> {
    let ids: Vec<i32> = children.iter().map(|c| c.id).collect();
    plugin_instance_split::ActiveModel {
        plugin_inst_id: Set(parent_id),
        creation_date: Set(Utc::now()),
        filter: Set(filter.to_string()),
        created_plugin_inst_ids: Set(serde_json::json!(ids)),
        ..Default::default()
    }
    .insert(conn)
    .await
    .map_err(|e| SplitError::PartialPersistFailure(e).into())
}

fn persist_failure(err: EngineError) -> EngineError {
    match err {
        EngineError::Database(e) => SplitError::PartialPersistFailure(e).into(),
        other => other,
    }
}
