use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use common::parameter::escapes_root;

use super::error::StorageError;
use super::{FileIndex, OutputFile};
use crate::entity::plugin_instance;

/// File index over a local directory tree.
///
/// Output folders are resolved as `{root}/{output_folder}`.
pub struct FilesystemFileIndex {
    root: PathBuf,
}

impl FilesystemFileIndex {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of an output folder, rejecting folders outside the root.
    pub fn resolve(&self, output_folder: &str) -> Result<PathBuf, StorageError> {
        if escapes_root(output_folder) {
            return Err(StorageError::InvalidPath(output_folder.to_string()));
        }
        Ok(self.root.join(output_folder))
    }

    /// Every regular file below `output_folder`, sorted by relative path.
    pub async fn list_folder(&self, output_folder: &str) -> Result<Vec<OutputFile>, StorageError> {
        let dir = self.resolve(output_folder)?;
        if !dir.is_dir() {
            return Err(StorageError::NotFound(output_folder.to_string()));
        }

        let mut files = tokio::task::spawn_blocking(move || walk(&dir))
            .await
            .map_err(|e| StorageError::Io(std::io::Error::other(e)))??;
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }
}

fn walk(base: &Path) -> Result<Vec<OutputFile>, StorageError> {
    let mut out = Vec::new();
    let mut pending = vec![base.to_path_buf()];

    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            let path = entry.path();
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() {
                let relative = path
                    .strip_prefix(base)
                    .map_err(|e| StorageError::Io(std::io::Error::other(e)))?;
                let relative = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                out.push(OutputFile {
                    path: relative,
                    size: entry.metadata()?.len(),
                });
            }
        }
    }

    Ok(out)
}

#[async_trait]
impl FileIndex for FilesystemFileIndex {
    async fn list_outputs(
        &self,
        instance: &plugin_instance::Model,
    ) -> Result<Vec<OutputFile>, StorageError> {
        let folder = instance
            .output_folder
            .as_deref()
            .ok_or(StorageError::NoOutputFolder(instance.id))?;
        self.list_folder(folder).await
    }
}
