use std::fs;
use std::path::Path;

use chrono::Utc;
use common::{DescriptorError, PluginDescriptor};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, SqlErr, TransactionTrait,
};
use tracing::{debug, info};

use crate::entity::{compute_resource, plugin, plugin_parameter};
use crate::error::EngineError;

pub const MANIFEST_FILE: &str = "plugin.toml";
pub const MAX_RESOURCE_NAME_LEN: usize = 100;

/// Persist a descriptor as a plugin with its parameters, in one transaction.
///
/// The compute resource is created on first use. Registering the same
/// (name, version) twice is a validation error.
pub async fn register_plugin(
    db: &DatabaseConnection,
    descriptor: &PluginDescriptor,
) -> Result<plugin::Model, EngineError> {
    descriptor.validate()?;

    let txn = db.begin().await?;
    if find_plugin(&txn, &descriptor.name, &descriptor.version)
        .await?
        .is_some()
    {
        return Err(already_registered(descriptor));
    }

    let resource = get_or_create_compute_resource(&txn, &descriptor.compute_resource).await?;
    let limits = &descriptor.resources;

    let plugin = plugin::ActiveModel {
        name: Set(descriptor.name.clone()),
        version: Set(descriptor.version.clone()),
        title: Set(descriptor.title.clone()),
        description: Set(descriptor.description.clone()),
        license: Set(descriptor.license.clone()),
        plugin_type: Set(descriptor.kind().as_str().to_string()),
        selfexec: Set(descriptor.selfexec.clone()),
        execshell: Set(descriptor.execshell.clone()),
        compute_resource_id: Set(resource.id),
        min_cpu_limit: Set(limits.cpu.min),
        max_cpu_limit: Set(limits.cpu.max),
        default_cpu_limit: Set(limits.cpu.default),
        min_memory_limit: Set(limits.memory.min),
        max_memory_limit: Set(limits.memory.max),
        default_memory_limit: Set(limits.memory.default),
        min_gpu_limit: Set(limits.gpu.min),
        max_gpu_limit: Set(limits.gpu.max),
        default_gpu_limit: Set(limits.gpu.default),
        min_number_of_workers: Set(limits.workers.min),
        max_number_of_workers: Set(limits.workers.max),
        default_number_of_workers: Set(limits.workers.default),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(&txn)
    .await
    .map_err(|e| {
        if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
            already_registered(descriptor)
        } else {
            e.into()
        }
    })?;

    for spec in &descriptor.parameters {
        plugin_parameter::ActiveModel {
            plugin_id: Set(plugin.id),
            name: Set(spec.name.clone()),
            flag: Set(spec.flag.clone()),
            kind: Set(spec.kind),
            optional: Set(spec.optional),
            action: Set(spec.action.clone()),
            default_json: Set(spec.default_value().map(|v| v.to_json())),
            help: Set(spec.help.clone()),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
    }

    txn.commit().await?;

    info!(
        plugin_id = plugin.id,
        name = %plugin.name,
        version = %plugin.version,
        parameters = descriptor.parameters.len(),
        "Registered plugin"
    );
    Ok(plugin)
}

fn already_registered(descriptor: &PluginDescriptor) -> EngineError {
    EngineError::Validation(format!(
        "plugin {} {} is already registered",
        descriptor.name, descriptor.version
    ))
}

pub async fn find_plugin<C: ConnectionTrait>(
    conn: &C,
    name: &str,
    version: &str,
) -> Result<Option<plugin::Model>, EngineError> {
    Ok(plugin::Entity::find()
        .filter(plugin::Column::Name.eq(name))
        .filter(plugin::Column::Version.eq(version))
        .one(conn)
        .await?)
}

pub async fn get_or_create_compute_resource<C: ConnectionTrait>(
    conn: &C,
    name: &str,
) -> Result<compute_resource::Model, EngineError> {
    if name.trim().is_empty() || name.chars().count() > MAX_RESOURCE_NAME_LEN {
        return Err(EngineError::Validation(format!(
            "compute resource name must be 1 to {MAX_RESOURCE_NAME_LEN} characters"
        )));
    }

    if let Some(existing) = compute_resource::Entity::find()
        .filter(compute_resource::Column::Name.eq(name))
        .one(conn)
        .await?
    {
        return Ok(existing);
    }

    let created = compute_resource::ActiveModel {
        name: Set(name.to_string()),
        description: Set(None),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(conn)
    .await?;
    info!(compute_resource = %created.name, "Created compute resource");
    Ok(created)
}

/// Parse every `<dir>/<plugin>/plugin.toml`, sorted by directory name.
///
/// The first malformed descriptor aborts the whole load.
pub fn load_descriptors(dir: &Path) -> Result<Vec<PluginDescriptor>, DescriptorError> {
    let read_err = |path: &Path, source| DescriptorError::Read {
        path: path.display().to_string(),
        source,
    };

    let mut manifests = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| read_err(dir, e))? {
        let entry = entry.map_err(|e| read_err(dir, e))?;
        let manifest = entry.path().join(MANIFEST_FILE);
        if entry.path().is_dir() && manifest.is_file() {
            manifests.push(manifest);
        }
    }
    manifests.sort();

    manifests
        .iter()
        .map(|path| {
            let content = fs::read_to_string(path).map_err(|e| read_err(path, e))?;
            PluginDescriptor::from_toml(&content)
        })
        .collect()
}

/// Register every descriptor under `dir` that is not registered yet.
pub async fn sync_plugins_dir(
    db: &DatabaseConnection,
    dir: &Path,
) -> Result<Vec<plugin::Model>, EngineError> {
    let mut registered = Vec::new();
    for descriptor in load_descriptors(dir)? {
        if find_plugin(db, &descriptor.name, &descriptor.version)
            .await?
            .is_some()
        {
            debug!(name = %descriptor.name, version = %descriptor.version, "Plugin already registered");
            continue;
        }
        registered.push(register_plugin(db, &descriptor).await?);
    }
    Ok(registered)
}
