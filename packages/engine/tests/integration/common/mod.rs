use std::path::PathBuf;
use std::sync::Arc;

use common::PluginDescriptor;
use common::event::StatusEvent;
use common::plugin_job::PluginJob;
use sea_orm::DatabaseConnection;
use serde_json::{Map, Value, json};
use tempfile::TempDir;
use tokio::sync::{broadcast, mpsc};

use engine::config::DatabaseConfig;
use engine::dispatch::ChannelDispatcher;
use engine::entity::{plugin, plugin_instance};
use engine::notify::{BroadcastNotifier, Notifier};
use engine::storage::FilesystemFileIndex;
use engine::{CreateInstance, Engine, database, registry};

pub const HOLDER: &str = "test-engine";
pub const OWNER: i32 = 1;
pub const FEED: i32 = 7;

/// An engine on a private in-memory database and storage root.
pub struct TestEngine {
    pub engine: Engine,
    pub db: DatabaseConnection,
    pub jobs: mpsc::UnboundedReceiver<PluginJob>,
    notifier: BroadcastNotifier,
    storage: TempDir,
}

impl TestEngine {
    pub async fn spawn() -> Self {
        Self::build(None).await
    }

    /// Like [`TestEngine::spawn`], but status events go to `notifier`.
    pub async fn spawn_with_notifier(notifier: Arc<dyn Notifier>) -> Self {
        Self::build(Some(notifier)).await
    }

    async fn build(custom: Option<Arc<dyn Notifier>>) -> Self {
        // A single connection keeps every query on the same in-memory database.
        let mut config = DatabaseConfig::new("sqlite::memory:");
        config.max_connections = 1;
        config.min_connections = 1;

        let db = database::init_db(&config)
            .await
            .expect("Failed to initialize test database");
        database::ensure_indexes(&db)
            .await
            .expect("Failed to create indexes");

        let storage = TempDir::new().expect("Failed to create storage root");
        let notifier = BroadcastNotifier::new(64);
        let (dispatcher, jobs) = ChannelDispatcher::new();

        let engine_notifier = custom.unwrap_or_else(|| Arc::new(notifier.clone()));

        let engine = Engine::new(
            db.clone(),
            Arc::new(FilesystemFileIndex::new(storage.path())),
            engine_notifier,
            Arc::new(dispatcher),
            HOLDER,
        );

        Self {
            engine,
            db,
            jobs,
            notifier,
            storage,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.notifier.subscribe()
    }

    /// Make every further dispatch fail.
    pub fn close_backend(&mut self) {
        self.jobs.close();
    }

    pub fn storage_root(&self) -> PathBuf {
        self.storage.path().to_path_buf()
    }

    pub async fn register(&self, descriptor: Value) -> plugin::Model {
        let descriptor = PluginDescriptor::from_json(descriptor).expect("Invalid test descriptor");
        registry::register_plugin(&self.db, &descriptor)
            .await
            .expect("Failed to register plugin")
    }

    /// `pl-dircopy`: fs plugin with a required `dir` path.
    pub async fn fs_plugin(&self) -> plugin::Model {
        self.register(fs_descriptor()).await
    }

    /// `pl-simpledsapp`: ds plugin with an optional `prefix` and `filter`.
    pub async fn ds_plugin(&self) -> plugin::Model {
        self.register(ds_descriptor()).await
    }

    pub async fn create_fs_instance(&self, plugin_id: i32) -> plugin_instance::Model {
        self.engine
            .create_instance(CreateInstance {
                plugin_id,
                owner_id: OWNER,
                feed_id: Some(FEED),
                parameters: params(json!({"dir": "uploads/scans"})),
                ..Default::default()
            })
            .await
            .expect("Failed to create instance")
    }

    /// Write files below the output folder of `instance`.
    pub fn write_outputs(&self, instance: &plugin_instance::Model, files: &[(&str, &str)]) {
        let folder = instance
            .output_folder
            .as_deref()
            .expect("Instance has no output folder");
        for (path, content) in files {
            let full = self.storage.path().join(folder).join(path);
            std::fs::create_dir_all(full.parent().expect("Output path has no parent"))
                .expect("Failed to create output directory");
            std::fs::write(&full, content).expect("Failed to write output file");
        }
    }

    /// Drive a waiting instance through a successful run.
    pub async fn run_to_exit(&mut self, instance_id: i32, success: bool) -> plugin_instance::Model {
        self.engine
            .schedule(instance_id)
            .await
            .expect("Failed to schedule");
        self.jobs.recv().await.expect("No job dispatched");
        self.engine
            .mark_started(instance_id)
            .await
            .expect("Failed to mark started");
        self.engine
            .mark_exited(instance_id, success, "done", "{}")
            .await
            .expect("Failed to mark exited")
    }

    /// An fs instance that finished with the given output files.
    pub async fn finished_fs_instance(&mut self, files: &[(&str, &str)]) -> plugin_instance::Model {
        let plugin = self.fs_plugin().await;
        let instance = self.create_fs_instance(plugin.id).await;
        self.write_outputs(&instance, files);
        self.run_to_exit(instance.id, true).await
    }
}

pub fn params(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("params must be a JSON object"),
    }
}

pub fn fs_descriptor() -> Value {
    json!({
        "name": "pl-dircopy",
        "version": "2.1.1",
        "title": "Copy a directory",
        "description": "Copies an input directory into a new feed",
        "license": "MIT",
        "type": "fs",
        "selfexec": "dircopy",
        "execshell": "python3",
        "parameters": [
            {"name": "dir", "flag": "--dir", "type": "path", "optional": false},
            {"name": "verbose", "flag": "-v", "type": "boolean", "optional": true,
             "default": false, "action": "store_true"}
        ]
    })
}

pub fn ds_descriptor() -> Value {
    json!({
        "name": "pl-simpledsapp",
        "version": "2.0.0",
        "title": "Simple ds app",
        "description": "Copies its input",
        "license": "MIT",
        "type": "ds",
        "compute_resource": "galena",
        "parameters": [
            {"name": "prefix", "flag": "--prefix", "type": "string", "optional": true, "default": "out"},
            {"name": "filter", "flag": "--filter", "type": "string", "optional": true}
        ]
    })
}
