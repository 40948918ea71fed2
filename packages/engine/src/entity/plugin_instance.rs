use common::InstanceStatus;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One execution of one plugin version against one feed.
///
/// `previous_id` is the only stored lineage edge. Children are found by
/// querying for rows whose `previous_id` points here.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "plugin_instance")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// At most 100 characters.
    pub title: String,
    pub status: InstanceStatus,

    pub start_date: DateTimeUtc,
    pub end_date: Option<DateTimeUtc>,

    /// At most 4000 characters, truncated on write.
    #[sea_orm(column_type = "Text")]
    pub summary: String,
    #[sea_orm(column_type = "Text")]
    pub raw: String,
    /// Total bytes of registered outputs.
    pub size: i64,
    /// At most 7 characters. See `InstanceErrorCode`.
    pub error_code: Option<String>,

    /// Millicores.
    pub cpu_limit: i32,
    /// Mi units.
    pub memory_limit: i32,
    pub number_of_workers: i32,
    pub gpu_limit: i32,

    pub feed_id: i32,
    pub owner_id: i32,
    pub workflow_id: Option<i32>,
    pub previous_id: Option<i32>,

    pub plugin_id: i32,
    #[sea_orm(belongs_to, from = "plugin_id", to = "id")]
    pub plugin: HasOne<super::plugin::Entity>,

    pub compute_resource_id: Option<i32>,

    #[sea_orm(unique)]
    pub output_folder: Option<String>,

    #[sea_orm(has_many)]
    pub bindings: HasMany<super::parameter_binding::Entity>,
    #[sea_orm(has_one)]
    pub lock: HasOne<super::plugin_instance_lock::Entity>,
    #[sea_orm(has_many)]
    pub splits: HasMany<super::plugin_instance_split::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}
