use std::time::Duration;

use sea_orm::sea_query::{
    Index, IndexCreateStatement, MysqlQueryBuilder, PostgresQueryBuilder, SqliteQueryBuilder,
};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, DbErr};
use tracing::{info, warn};

use crate::config::DatabaseConfig;
use crate::entity::{plugin_instance, plugin_instance_split};

pub async fn init_db(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(config.url.to_owned());

    opt.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .sqlx_logging(config.sqlx_logging);
    if let Some(secs) = config.idle_timeout_secs {
        opt.idle_timeout(Duration::from_secs(secs));
    }
    if let Some(secs) = config.max_lifetime_secs {
        opt.max_lifetime(Duration::from_secs(secs));
    }

    let db = Database::connect(opt).await?;
    db.get_schema_registry("engine::entity::*")
        .sync(&db)
        .await?;

    Ok(db)
}

/// Create the non-unique composite indexes the schema sync does not derive.
pub async fn ensure_indexes(db: &DatabaseConnection) -> Result<(), DbErr> {
    // Scheduler scans: WHERE status = ? ORDER BY start_date
    let status_scan = Index::create()
        .if_not_exists()
        .name("idx_plugin_instance_status_start")
        .table(plugin_instance::Entity)
        .col(plugin_instance::Column::Status)
        .col(plugin_instance::Column::StartDate)
        .to_owned();

    // Reverse lineage lookups: WHERE previous_id = ?
    let previous = Index::create()
        .if_not_exists()
        .name("idx_plugin_instance_previous")
        .table(plugin_instance::Entity)
        .col(plugin_instance::Column::PreviousId)
        .to_owned();

    let splits = Index::create()
        .if_not_exists()
        .name("idx_plugin_instance_split_inst_created")
        .table(plugin_instance_split::Entity)
        .col(plugin_instance_split::Column::PluginInstId)
        .col(plugin_instance_split::Column::CreationDate)
        .to_owned();

    for stmt in [status_scan, previous, splits] {
        let sql = build_index(db.get_database_backend(), &stmt);
        match db.execute_unprepared(&sql).await {
            Ok(_) => info!(sql = %sql, "Ensured index exists"),
            Err(e) => warn!(error = %e, sql = %sql, "Failed to create index"),
        }
    }

    Ok(())
}

fn build_index(backend: DbBackend, stmt: &IndexCreateStatement) -> String {
    match backend {
        DbBackend::Sqlite => stmt.to_string(SqliteQueryBuilder),
        DbBackend::MySql => stmt.to_string(MysqlQueryBuilder),
        _ => stmt.to_string(PostgresQueryBuilder),
    }
}
