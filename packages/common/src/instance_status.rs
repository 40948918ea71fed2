#[cfg(feature = "sea-orm")]
use sea_orm::prelude::StringLen;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status of a plugin instance during its execution lifecycle.
///
/// When the `sea-orm` feature is enabled, this enum can be used directly in SeaORM entities.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(
    feature = "sea-orm",
    derive(sea_orm::DeriveActiveEnum, sea_orm::EnumIter),
    sea_orm(rs_type = "String", db_type = "String(StringLen::None)")
)]
#[serde(rename_all = "camelCase")]
pub enum InstanceStatus {
    /// Parameters and resources are being validated.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "created"))]
    Created,
    /// Waiting to be scheduled on a compute resource.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "waiting"))]
    Waiting,
    /// Assigned to a compute resource, job dispatched.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "scheduled"))]
    Scheduled,
    /// The execution backend reported the job running.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "started"))]
    Started,
    /// The job exited and its outputs are being ingested.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "registeringFiles"))]
    RegisteringFiles,
    /// All outputs registered.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "finishedSuccessfully"))]
    FinishedSuccessfully,
    /// Execution, dispatch or registration failed.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "finishedWithError"))]
    FinishedWithError,
    /// Cancelled on request.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "cancelled"))]
    Cancelled,
}

impl InstanceStatus {
    /// Returns true once no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::FinishedSuccessfully | Self::FinishedWithError | Self::Cancelled
        )
    }

    /// Position in the forward ordering. All terminal states share the last rank.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Created => 0,
            Self::Waiting => 1,
            Self::Scheduled => 2,
            Self::Started => 3,
            Self::RegisteringFiles => 4,
            Self::FinishedSuccessfully | Self::FinishedWithError | Self::Cancelled => 5,
        }
    }

    /// Whether `self -> next` is a legal edge of the lifecycle automaton.
    pub fn can_transition_to(&self, next: InstanceStatus) -> bool {
        if self.is_terminal() {
            return false;
        }

        match next {
            Self::FinishedWithError | Self::Cancelled => true,
            Self::Waiting => *self == Self::Created,
            Self::Scheduled => *self == Self::Waiting,
            Self::Started => *self == Self::Scheduled,
            Self::RegisteringFiles => *self == Self::Started,
            Self::FinishedSuccessfully => *self == Self::RegisteringFiles,
            Self::Created => false,
        }
    }

    /// Statuses entering which emits a progress notification.
    pub fn is_notified(&self) -> bool {
        matches!(
            self,
            Self::RegisteringFiles | Self::FinishedSuccessfully | Self::FinishedWithError
        )
    }

    /// All possible status values.
    pub const ALL: &'static [InstanceStatus] = &[
        Self::Created,
        Self::Waiting,
        Self::Scheduled,
        Self::Started,
        Self::RegisteringFiles,
        Self::FinishedSuccessfully,
        Self::FinishedWithError,
        Self::Cancelled,
    ];

    /// Non-terminal statuses.
    pub const ACTIVE: &'static [InstanceStatus] = &[
        Self::Created,
        Self::Waiting,
        Self::Scheduled,
        Self::Started,
        Self::RegisteringFiles,
    ];

    /// Returns the string representation (camelCase).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Waiting => "waiting",
            Self::Scheduled => "scheduled",
            Self::Started => "started",
            Self::RegisteringFiles => "registeringFiles",
            Self::FinishedSuccessfully => "finishedSuccessfully",
            Self::FinishedWithError => "finishedWithError",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for InstanceStatus {
    fn default() -> Self {
        Self::Created
    }
}

/// Error codes recorded on instances that end in `finishedWithError`.
pub struct InstanceErrorCode;

impl InstanceErrorCode {
    /// The execution backend reported a failed exit.
    pub const EXECUTION_FAILED: &'static str = "EXEC01";
    /// Output registration failed.
    pub const STORAGE_FAILED: &'static str = "STORE01";
    /// The job could not be handed to the execution backend.
    pub const DISPATCH_FAILED: &'static str = "DISP01";
    /// Longest code the `error_code` column accepts.
    pub const MAX_LEN: usize = 7;
}

/// Error when parsing an invalid status string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseStatusError {
    invalid: String,
}

impl fmt::Display for ParseStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid status '{}'. Valid values: {}",
            self.invalid,
            InstanceStatus::ALL
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

impl std::error::Error for ParseStatusError {}

impl FromStr for InstanceStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InstanceStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseStatusError {
                invalid: s.to_string(),
            })
    }
}
