use common::{DescriptorError, InstanceStatus, ParameterError, ResourceLimitError};
use sea_orm::DbErr;
use thiserror::Error;

use crate::storage::StorageError;

/// Failures of a split request.
#[derive(Debug, Error)]
pub enum SplitError {
    /// The filter selected no output file at all.
    #[error("filter '{filter}' matches no output file")]
    EmptyFilter { filter: String },
    /// Writing children or the split record failed; nothing was kept.
    #[error("split could not be persisted: {0}")]
    PartialPersistFailure(#[source] DbErr),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    ResourceLimit(#[from] ResourceLimitError),

    #[error("instance {instance_id} is locked by another actor")]
    LockContention { instance_id: i32 },

    /// The caller's lock row was reaped while it was still working.
    #[error("lock on instance {instance_id} was lost before the write")]
    LockLost { instance_id: i32 },

    #[error("state conflict: {0}")]
    StateConflict(String),

    #[error(transparent)]
    Split(#[from] SplitError),

    #[error("{0} not found")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("database error: {0}")]
    Database(#[from] DbErr),
}

impl EngineError {
    /// Only lock trouble is worth retrying; the engine itself never does.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LockContention { .. } | Self::LockLost { .. })
    }

    pub fn transition(instance_id: i32, from: InstanceStatus, to: InstanceStatus) -> Self {
        Self::StateConflict(format!(
            "instance {instance_id} cannot move from {from} to {to}"
        ))
    }

    pub fn instance_not_found(instance_id: i32) -> Self {
        Self::NotFound(format!("plugin instance {instance_id}"))
    }

    pub fn parameter(name: &str, err: ParameterError) -> Self {
        Self::Validation(format!("parameter '{name}': {err}"))
    }
}

impl From<DescriptorError> for EngineError {
    fn from(err: DescriptorError) -> Self {
        Self::Validation(err.to_string())
    }
}
