use common::{InstanceStatus, ParameterValue};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use serde_json::json;

use engine::entity::{plugin_instance, plugin_parameter};
use engine::params::ParameterStore;
use engine::{CreateInstance, EngineError};

use crate::common::{FEED, OWNER, TestEngine, params};

async fn parameter(app: &TestEngine, plugin_id: i32, name: &str) -> plugin_parameter::Model {
    plugin_parameter::Entity::find()
        .filter(plugin_parameter::Column::PluginId.eq(plugin_id))
        .filter(plugin_parameter::Column::Name.eq(name))
        .one(&app.db)
        .await
        .unwrap()
        .unwrap()
}

async fn bound_values(app: &TestEngine, instance_id: i32) -> Vec<(String, ParameterValue)> {
    ParameterStore::new(&app.db)
        .bindings(instance_id)
        .await
        .unwrap()
        .into_iter()
        .map(|(param, value)| (param.name, value))
        .collect()
}

async fn instance_count(app: &TestEngine) -> u64 {
    plugin_instance::Entity::find().count(&app.db).await.unwrap()
}

mod binding {
    use super::*;

    #[tokio::test]
    async fn binds_values_and_defaults_in_declaration_order() {
        let app = TestEngine::spawn().await;
        let plugin = app.fs_plugin().await;

        let instance = app.create_fs_instance(plugin.id).await;

        assert_eq!(
            bound_values(&app, instance.id).await,
            vec![
                ("dir".to_string(), ParameterValue::Path("uploads/scans".into())),
                ("verbose".to_string(), ParameterValue::Boolean(false)),
            ]
        );
    }

    #[tokio::test]
    async fn optional_without_default_stays_unbound() {
        let app = TestEngine::spawn().await;
        let fs = app.fs_plugin().await;
        let ds = app.ds_plugin().await;
        let root = app.create_fs_instance(fs.id).await;

        let child = app
            .engine
            .create_instance(CreateInstance {
                plugin_id: ds.id,
                owner_id: OWNER,
                previous_id: Some(root.id),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(
            bound_values(&app, child.id).await,
            vec![("prefix".to_string(), ParameterValue::String("out".into()))]
        );
    }

    #[tokio::test]
    async fn second_bind_is_rejected_and_first_kept() {
        let app = TestEngine::spawn().await;
        let plugin = app.fs_plugin().await;
        let instance = app.create_fs_instance(plugin.id).await;
        let dir = parameter(&app, plugin.id, "dir").await;

        let result = ParameterStore::new(&app.db)
            .bind(instance.id, &dir, Some(&json!("elsewhere")))
            .await;

        assert!(matches!(result, Err(EngineError::Validation(msg)) if msg.contains("already bound")));
        assert_eq!(
            bound_values(&app, instance.id).await[0].1,
            ParameterValue::Path("uploads/scans".into())
        );
    }

    #[tokio::test]
    async fn bind_rejects_wrong_type() {
        let app = TestEngine::spawn().await;
        let plugin = app.fs_plugin().await;
        let instance = app.create_fs_instance(plugin.id).await;
        let verbose = parameter(&app, plugin.id, "verbose").await;

        let result = ParameterStore::new(&app.db)
            .bind(instance.id, &verbose, Some(&json!("yes")))
            .await;

        assert!(matches!(result, Err(EngineError::Validation(_))));
    }
}

mod rejection {
    use super::*;

    async fn create_with(app: &TestEngine, plugin_id: i32, raw: serde_json::Value) -> EngineError {
        app.engine
            .create_instance(CreateInstance {
                plugin_id,
                owner_id: OWNER,
                feed_id: Some(FEED),
                parameters: params(raw),
                ..Default::default()
            })
            .await
            .unwrap_err()
    }

    #[tokio::test]
    async fn mistyped_value_writes_nothing() {
        let app = TestEngine::spawn().await;
        let plugin = app.fs_plugin().await;

        let err = create_with(&app, plugin.id, json!({"dir": 5})).await;

        assert!(matches!(err, EngineError::Validation(msg) if msg.contains("dir")));
        assert_eq!(instance_count(&app).await, 0);
    }

    #[tokio::test]
    async fn missing_required_parameter() {
        let app = TestEngine::spawn().await;
        let plugin = app.fs_plugin().await;

        let err = create_with(&app, plugin.id, json!({"verbose": true})).await;
        assert!(matches!(err, EngineError::Validation(msg) if msg.contains("required")));

        let err = create_with(&app, plugin.id, json!({"dir": null})).await;
        assert!(matches!(err, EngineError::Validation(_)));
        assert_eq!(instance_count(&app).await, 0);
    }

    #[tokio::test]
    async fn unknown_parameter() {
        let app = TestEngine::spawn().await;
        let plugin = app.fs_plugin().await;

        let err = create_with(&app, plugin.id, json!({"dir": "a", "colour": "red"})).await;

        assert!(matches!(err, EngineError::Validation(msg) if msg.contains("colour")));
    }

    #[tokio::test]
    async fn explicit_value_overrides_default() {
        let app = TestEngine::spawn().await;
        let plugin = app.fs_plugin().await;

        let instance = app
            .engine
            .create_instance(CreateInstance {
                plugin_id: plugin.id,
                owner_id: OWNER,
                feed_id: Some(FEED),
                parameters: params(json!({"dir": "a,b", "verbose": true})),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(instance.status, InstanceStatus::Waiting);
        assert_eq!(
            bound_values(&app, instance.id).await[1].1,
            ParameterValue::Boolean(true)
        );
    }
}
