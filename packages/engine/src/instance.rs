use chrono::Utc;
use common::{InstanceStatus, PluginType, ResourceRequest};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde_json::{Map, Value};
use tracing::info;

use crate::engine::Engine;
use crate::entity::{plugin, plugin_instance, plugin_parameter};
use crate::error::EngineError;
use crate::params::{ParameterStore, validate_parameters};

pub const MAX_TITLE_LEN: usize = 100;

/// A client request to run a plugin.
#[derive(Debug, Clone, Default)]
pub struct CreateInstance {
    pub plugin_id: i32,
    pub owner_id: i32,
    /// Required for `fs` plugins; otherwise inherited from `previous_id`.
    pub feed_id: Option<i32>,
    pub previous_id: Option<i32>,
    pub workflow_id: Option<i32>,
    pub title: Option<String>,
    pub parameters: Map<String, Value>,
    pub resources: ResourceRequest,
}

impl Engine {
    /// Validate and persist a new instance. It is `waiting` once this returns.
    pub async fn create_instance(
        &self,
        request: CreateInstance,
    ) -> Result<plugin_instance::Model, EngineError> {
        let txn = self.db().begin().await?;
        let instance = create_in(&txn, &request).await?;
        txn.commit().await?;

        info!(
            instance_id = instance.id,
            plugin_id = instance.plugin_id,
            feed_id = instance.feed_id,
            previous_id = ?instance.previous_id,
            "Created plugin instance"
        );
        Ok(instance)
    }
}

/// Create an instance and its bindings on `conn`.
///
/// Nothing is written unless every validation passes, but callers must still
/// run this inside a transaction so a failing insert leaves no partial rows.
pub async fn create_in<C: ConnectionTrait>(
    conn: &C,
    request: &CreateInstance,
) -> Result<plugin_instance::Model, EngineError> {
    let plugin = plugin::Entity::find_by_id(request.plugin_id)
        .one(conn)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("plugin {}", request.plugin_id)))?;

    let title = request.title.clone().unwrap_or_else(|| plugin.name.clone());
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(EngineError::Validation(format!(
            "title exceeds maximum length of {MAX_TITLE_LEN} characters"
        )));
    }

    let params = plugin_parameter::Entity::find()
        .filter(plugin_parameter::Column::PluginId.eq(plugin.id))
        .order_by_asc(plugin_parameter::Column::Id)
        .all(conn)
        .await?;
    let resolved = validate_parameters(&params, &request.parameters)?;

    let effective = plugin.resource_limits().clamp(&request.resources)?;
    let feed_id = resolve_feed(conn, &plugin, request).await?;

    let instance = plugin_instance::ActiveModel {
        title: Set(title),
        status: Set(InstanceStatus::Created),
        start_date: Set(Utc::now()),
        end_date: Set(None),
        summary: Set(String::new()),
        raw: Set(String::new()),
        size: Set(0),
        error_code: Set(None),
        cpu_limit: Set(effective.cpu_limit.0),
        memory_limit: Set(effective.memory_limit.0),
        number_of_workers: Set(effective.number_of_workers),
        gpu_limit: Set(effective.gpu_limit),
        feed_id: Set(feed_id),
        owner_id: Set(request.owner_id),
        workflow_id: Set(request.workflow_id),
        previous_id: Set(request.previous_id),
        plugin_id: Set(plugin.id),
        compute_resource_id: Set(None),
        output_folder: Set(None),
        ..Default::default()
    }
    .insert(conn)
    .await?;

    ParameterStore::new(conn)
        .bind_all(instance.id, &resolved)
        .await?;

    let output_folder = format!("feed_{}/{}_{}/data", feed_id, plugin.name, instance.id);
    let mut active = instance.into_active_model();
    active.output_folder = Set(Some(output_folder));
    active.status = Set(InstanceStatus::Waiting);
    Ok(active.update(conn).await?)
}

/// Enforce how the plugin type chains and pick the feed.
async fn resolve_feed<C: ConnectionTrait>(
    conn: &C,
    plugin: &plugin::Model,
    request: &CreateInstance,
) -> Result<i32, EngineError> {
    let kind = plugin.kind().ok_or_else(|| {
        EngineError::Validation(format!("plugin type '{}' is unknown", plugin.plugin_type))
    })?;

    let previous = match request.previous_id {
        Some(previous_id) => Some(
            plugin_instance::Entity::find_by_id(previous_id)
                .one(conn)
                .await?
                .ok_or_else(|| EngineError::instance_not_found(previous_id))?,
        ),
        None => None,
    };

    match (kind, previous) {
        (PluginType::Fs, Some(_)) => Err(EngineError::Validation(
            "fs plugins cannot have a previous instance".into(),
        )),
        (PluginType::Ds, None) => Err(EngineError::Validation(
            "ds plugins require a previous instance".into(),
        )),
        (_, Some(previous)) => match request.feed_id {
            Some(feed_id) if feed_id != previous.feed_id => Err(EngineError::Validation(
                format!(
                    "feed {feed_id} does not match feed {} of previous instance {}",
                    previous.feed_id, previous.id
                ),
            )),
            _ => Ok(previous.feed_id),
        },
        (_, None) => request
            .feed_id
            .ok_or_else(|| EngineError::Validation(format!("{kind} plugins require a feed"))),
    }
}
