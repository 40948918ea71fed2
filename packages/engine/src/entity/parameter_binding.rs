use common::ParameterKind;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A typed value bound to one declared parameter of one instance. Write-once.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "parameter_binding")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique_key = "inst_param")]
    pub plugin_inst_id: i32,
    #[sea_orm(belongs_to, from = "plugin_inst_id", to = "id")]
    pub plugin_inst: HasOne<super::plugin_instance::Entity>,

    #[sea_orm(unique_key = "inst_param")]
    pub plugin_param_id: i32,
    #[sea_orm(belongs_to, from = "plugin_param_id", to = "id")]
    pub plugin_param: HasOne<super::plugin_parameter::Entity>,

    /// Always equal to the declared kind of `plugin_param`.
    pub kind: ParameterKind,
    #[sea_orm(column_type = "JsonBinary")]
    pub value: Json,
}

impl ActiveModelBehavior for ActiveModel {}
