pub mod error;
pub mod filesystem;
pub mod filter;

pub use error::StorageError;
pub use filesystem::FilesystemFileIndex;
pub use filter::{FilterError, SplitFilter};

use async_trait::async_trait;

use crate::entity::plugin_instance;

/// A file produced by an instance, relative to its output folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    pub path: String,
    pub size: u64,
}

/// Files selected by one filter expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileGroup {
    pub selector: String,
    pub files: Vec<OutputFile>,
}

/// Storage collaborator that knows which files an instance produced.
#[async_trait]
pub trait FileIndex: Send + Sync {
    /// All files currently under the instance's output folder, sorted by path.
    async fn list_outputs(
        &self,
        instance: &plugin_instance::Model,
    ) -> Result<Vec<OutputFile>, StorageError>;

    /// Ingest the outputs of a finished job.
    async fn register_outputs(
        &self,
        instance: &plugin_instance::Model,
    ) -> Result<Vec<OutputFile>, StorageError> {
        self.list_outputs(instance).await
    }

    /// One group per filter expression, in expression order. Groups may be empty.
    async fn evaluate_filter(
        &self,
        instance: &plugin_instance::Model,
        filter: &SplitFilter,
    ) -> Result<Vec<FileGroup>, StorageError> {
        let files = self.list_outputs(instance).await?;
        Ok(filter.group(&files))
    }
}
