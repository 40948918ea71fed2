use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Presence of a row means the instance is locked.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "plugin_instance_lock")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique)]
    pub plugin_inst_id: i32,
    #[sea_orm(belongs_to, from = "plugin_inst_id", to = "id")]
    pub plugin_inst: HasOne<super::plugin_instance::Entity>,

    pub holder: String,
    /// Fresh per acquisition; row ids can be reused after a reap.
    pub token: String,
    pub acquired_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
