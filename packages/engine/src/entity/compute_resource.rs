use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A named execution backend. Referenced by plugins and instances, never mutated.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "compute_resource")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// At most 100 characters.
    #[sea_orm(unique)]
    pub name: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,

    #[sea_orm(has_many)]
    pub plugins: HasMany<super::plugin::Entity>,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
