use common::{PluginResourceLimits, PluginType, ResourceBounds};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "plugin")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique_key = "name_version")]
    pub name: String,
    #[sea_orm(unique_key = "name_version")]
    pub version: String,

    pub title: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    pub license: String,
    /// One of: fs, ds, ts
    pub plugin_type: String,
    pub selfexec: Option<String>,
    pub execshell: Option<String>,

    pub compute_resource_id: i32,
    #[sea_orm(belongs_to, from = "compute_resource_id", to = "id")]
    pub compute_resource: HasOne<super::compute_resource::Entity>,

    pub min_cpu_limit: i32,
    pub max_cpu_limit: i32,
    pub default_cpu_limit: Option<i32>,
    pub min_memory_limit: i32,
    pub max_memory_limit: i32,
    pub default_memory_limit: Option<i32>,
    pub min_gpu_limit: i32,
    pub max_gpu_limit: i32,
    pub default_gpu_limit: Option<i32>,
    pub min_number_of_workers: i32,
    pub max_number_of_workers: i32,
    pub default_number_of_workers: Option<i32>,

    #[sea_orm(has_many)]
    pub parameters: HasMany<super::plugin_parameter::Entity>,
    #[sea_orm(has_many)]
    pub instances: HasMany<super::plugin_instance::Entity>,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn kind(&self) -> Option<PluginType> {
        self.plugin_type.parse().ok()
    }

    /// Declared resource bounds as stored on the row.
    pub fn resource_limits(&self) -> PluginResourceLimits {
        let bounds = |min, max, default| ResourceBounds { min, max, default };
        PluginResourceLimits {
            cpu: bounds(self.min_cpu_limit, self.max_cpu_limit, self.default_cpu_limit),
            memory: bounds(
                self.min_memory_limit,
                self.max_memory_limit,
                self.default_memory_limit,
            ),
            gpu: bounds(self.min_gpu_limit, self.max_gpu_limit, self.default_gpu_limit),
            workers: bounds(
                self.min_number_of_workers,
                self.max_number_of_workers,
                self.default_number_of_workers,
            ),
        }
    }
}
