use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "plugin_instance_split")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub plugin_inst_id: i32,
    #[sea_orm(belongs_to, from = "plugin_inst_id", to = "id")]
    pub plugin_inst: HasOne<super::plugin_instance::Entity>,

    pub creation_date: DateTimeUtc,
    /// At most 600 characters.
    pub filter: String,
    /// Ids of the children, in creation order, as a JSON array.
    #[sea_orm(column_type = "JsonBinary")]
    pub created_plugin_inst_ids: Json,
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn child_ids(&self) -> Vec<i32> {
        serde_json::from_value(self.created_plugin_inst_ids.clone()).unwrap_or_default()
    }
}
