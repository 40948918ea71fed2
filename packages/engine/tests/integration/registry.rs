use std::fs;

use common::{DescriptorError, ParameterKind, PluginDescriptor, PluginType};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder};
use serde_json::json;
use tempfile::TempDir;

use engine::EngineError;
use engine::entity::{compute_resource, plugin, plugin_parameter};
use engine::registry::{self, MANIFEST_FILE};

use crate::common::{TestEngine, ds_descriptor, fs_descriptor};

const MANIFEST: &str = r#"
name = "pl-mri-convert"
version = "1.0.3"
title = "MRI converter"
description = "Converts DICOM series to NIfTI"
license = "MIT"
type = "ds"

[resources]
memory = { min = 1024, max = 8192 }
cpu = { min = 500, max = 4000 }

[[parameters]]
name = "outputFormat"
flag = "--format"
type = "string"
optional = true
default = "nii"
"#;

fn write_manifest(dir: &TempDir, plugin_dir: &str, content: &str) {
    let path = dir.path().join(plugin_dir);
    fs::create_dir_all(&path).unwrap();
    fs::write(path.join(MANIFEST_FILE), content).unwrap();
}

mod register {
    use super::*;

    #[tokio::test]
    async fn stores_plugin_parameters_and_limits() {
        let app = TestEngine::spawn().await;

        let plugin = app.ds_plugin().await;

        assert_eq!(plugin.kind(), Some(PluginType::Ds));
        assert_eq!(plugin.min_memory_limit, 200);
        let resource = compute_resource::Entity::find_by_id(plugin.compute_resource_id)
            .one(&app.db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resource.name, "galena");

        let params = plugin_parameter::Entity::find()
            .filter(plugin_parameter::Column::PluginId.eq(plugin.id))
            .order_by_asc(plugin_parameter::Column::Id)
            .all(&app.db)
            .await
            .unwrap();
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].name, "prefix");
        assert_eq!(params[0].kind, ParameterKind::String);
        assert_eq!(params[0].default_json, Some(json!("out")));
        assert_eq!(params[1].default_json, None);
    }

    #[tokio::test]
    async fn duplicate_version_is_rejected() {
        let app = TestEngine::spawn().await;
        app.fs_plugin().await;

        let descriptor = PluginDescriptor::from_json(fs_descriptor()).unwrap();
        let result = registry::register_plugin(&app.db, &descriptor).await;

        assert!(matches!(result, Err(EngineError::Validation(msg)) if msg.contains("already registered")));
        assert_eq!(plugin::Entity::find().count(&app.db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn versions_share_compute_resource() {
        let app = TestEngine::spawn().await;
        let first = app.fs_plugin().await;

        let mut next = fs_descriptor();
        next["version"] = json!("2.2.0");
        let second = app.register(next).await;

        assert_ne!(first.id, second.id);
        assert_eq!(first.compute_resource_id, second.compute_resource_id);
        assert_eq!(compute_resource::Entity::find().count(&app.db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn lookup_by_name_and_version() {
        let app = TestEngine::spawn().await;
        let registered = app.register(ds_descriptor()).await;

        let found = registry::find_plugin(&app.db, "pl-simpledsapp", "2.0.0")
            .await
            .unwrap();
        assert_eq!(found.map(|p| p.id), Some(registered.id));
        assert!(
            registry::find_plugin(&app.db, "pl-simpledsapp", "9.9.9")
                .await
                .unwrap()
                .is_none()
        );
    }
}

mod manifests {
    use super::*;

    #[test]
    fn loads_sorted_manifests_and_skips_bare_dirs() {
        let dir = TempDir::new().unwrap();
        write_manifest(&dir, "b-mri", MANIFEST);
        write_manifest(
            &dir,
            "a-copy",
            &MANIFEST
                .replace("pl-mri-convert", "pl-copy")
                .replace("type = \"ds\"", "type = \"fs\""),
        );
        fs::create_dir_all(dir.path().join("notes")).unwrap();

        let descriptors = registry::load_descriptors(dir.path()).unwrap();

        let names: Vec<&str> = descriptors.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["pl-copy", "pl-mri-convert"]);
        assert_eq!(descriptors[1].resources.memory.min, 1024);
        assert_eq!(descriptors[1].resources.cpu.min, 500);
    }

    #[test]
    fn malformed_manifest_aborts_load() {
        let dir = TempDir::new().unwrap();
        write_manifest(&dir, "ok", MANIFEST);
        write_manifest(&dir, "broken", "name = \"pl-broken\"\n");

        let result = registry::load_descriptors(dir.path());

        assert!(matches!(result, Err(DescriptorError::MissingFields { .. })));
    }

    #[tokio::test]
    async fn sync_registers_each_plugin_once() {
        let app = TestEngine::spawn().await;
        let dir = TempDir::new().unwrap();
        write_manifest(&dir, "mri", MANIFEST);

        let first = registry::sync_plugins_dir(&app.db, dir.path()).await.unwrap();
        let second = registry::sync_plugins_dir(&app.db, dir.path()).await.unwrap();

        assert_eq!(first.len(), 1);
        assert_eq!(first[0].min_memory_limit, 1024);
        assert!(second.is_empty());
        assert_eq!(plugin::Entity::find().count(&app.db).await.unwrap(), 1);
    }
}
