use common::{ParameterKind, ParameterValue};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "plugin_parameter")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique_key = "plugin_param_name")]
    pub plugin_id: i32,
    #[sea_orm(belongs_to, from = "plugin_id", to = "id")]
    pub plugin: HasOne<super::plugin::Entity>,

    #[sea_orm(unique_key = "plugin_param_name")]
    pub name: String,
    pub flag: String,
    pub kind: ParameterKind,
    pub optional: bool,
    /// "store", "store_true" or "store_false"
    pub action: String,
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub default_json: Option<Json>,
    #[sea_orm(column_type = "Text", nullable)]
    pub help: Option<String>,

    #[sea_orm(has_many)]
    pub bindings: HasMany<super::parameter_binding::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn default_value(&self) -> Option<ParameterValue> {
        match &self.default_json {
            None | Some(Json::Null) => None,
            Some(raw) => ParameterValue::parse(self.kind, raw).ok(),
        }
    }
}
