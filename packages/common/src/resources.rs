//! Resource quantities and the clamp policy applied to instance requests.
//!
//! CPU is measured in millicores, memory in Mi units. Every check here is pure,
//! so callers may retry freely.

use serde::{Deserialize, Deserializer, Serialize, de};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Upper bound used whenever a plugin does not declare one.
pub const UNBOUNDED: i32 = i32::MAX;

pub const DEFAULT_MIN_CPU: i32 = 1000;
pub const DEFAULT_MIN_MEMORY: i32 = 200;
pub const DEFAULT_MIN_WORKERS: i32 = 1;
pub const DEFAULT_MIN_GPU: i32 = 0;

/// The four limits a plugin instance may request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    CpuLimit,
    MemoryLimit,
    GpuLimit,
    NumberOfWorkers,
}

impl Resource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CpuLimit => "cpu_limit",
            Self::MemoryLimit => "memory_limit",
            Self::GpuLimit => "gpu_limit",
            Self::NumberOfWorkers => "number_of_workers",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of the declared range was violated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoundSide {
    Min,
    Max,
}

impl fmt::Display for BoundSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Min => f.write_str("minimum"),
            Self::Max => f.write_str("maximum"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceLimitError {
    #[error("{resource} {requested} is below the plugin {side} of {bound}")]
    BelowMin {
        resource: Resource,
        side: BoundSide,
        bound: i32,
        requested: i32,
    },
    #[error("{resource} {requested} is above the plugin {side} of {bound}")]
    AboveMax {
        resource: Resource,
        side: BoundSide,
        bound: i32,
        requested: i32,
    },
    #[error("invalid {resource} quantity '{input}': {reason}")]
    InvalidQuantity {
        resource: Resource,
        input: String,
        reason: String,
    },
    #[error("{resource} bounds are inconsistent: {reason}")]
    InvalidBounds { resource: Resource, reason: String },
}

impl ResourceLimitError {
    pub fn resource(&self) -> Resource {
        match self {
            Self::BelowMin { resource, .. }
            | Self::AboveMax { resource, .. }
            | Self::InvalidQuantity { resource, .. }
            | Self::InvalidBounds { resource, .. } => *resource,
        }
    }
}

/// CPU quantity in millicores (`"2000m"`, `"2"`, `"1.5"` or a bare integer of millicores).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Millicores(pub i32);

impl FromStr for Millicores {
    type Err = ResourceLimitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ResourceLimitError::InvalidQuantity {
            resource: Resource::CpuLimit,
            input: s.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(invalid("empty quantity"));
        }

        let millis = if let Some(m) = trimmed.strip_suffix('m') {
            m.parse::<u64>()
                .map_err(|_| invalid("millicores must be a whole number"))?
        } else {
            let cores = trimmed
                .parse::<f64>()
                .map_err(|_| invalid("expected cores or a value ending in 'm'"))?;
            if !cores.is_finite() || cores < 0.0 {
                return Err(invalid("cores must be a non-negative number"));
            }
            (cores * 1000.0).ceil() as u64
        };

        i32::try_from(millis)
            .map(Millicores)
            .map_err(|_| invalid("quantity exceeds the supported range"))
    }
}

impl fmt::Display for Millicores {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}m", self.0)
    }
}

/// Memory quantity in Mi units.
///
/// Accepts binary suffixes (`Ki`, `Mi`, `Gi`, `Ti`), decimal suffixes (`K`, `M`,
/// `G`, `T`) and bare integers, which are already Mi. Values that do not land on a
/// whole Mi are rounded up.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Mebibytes(pub i32);

const MI: u128 = 1 << 20;

impl FromStr for Mebibytes {
    type Err = ResourceLimitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ResourceLimitError::InvalidQuantity {
            resource: Resource::MemoryLimit,
            input: s.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = s.trim();
        let split = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(trimmed.len());
        let (digits, suffix) = trimmed.split_at(split);
        if digits.is_empty() {
            return Err(invalid("expected a whole number with an optional unit"));
        }
        let amount: u128 = digits
            .parse()
            .map_err(|_| invalid("quantity exceeds the supported range"))?;

        let bytes_per_unit: u128 = match suffix {
            "" | "Mi" => MI,
            "Ki" => 1 << 10,
            "Gi" => 1 << 30,
            "Ti" => 1 << 40,
            "K" => 1_000,
            "M" => 1_000_000,
            "G" => 1_000_000_000,
            "T" => 1_000_000_000_000,
            _ => return Err(invalid("unknown unit suffix")),
        };

        let bytes = amount
            .checked_mul(bytes_per_unit)
            .ok_or_else(|| invalid("quantity exceeds the supported range"))?;
        let mebibytes = bytes.div_ceil(MI);

        i32::try_from(mebibytes)
            .map(Mebibytes)
            .map_err(|_| invalid("quantity exceeds the supported range"))
    }
}

impl fmt::Display for Mebibytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Mi", self.0)
    }
}

/// Accepts either a JSON number (already in canonical units) or a quantity string.
fn deserialize_quantity<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr<Err = ResourceLimitError> + From<i32>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => i32::try_from(n)
            .map(T::from)
            .map_err(|_| de::Error::custom(format!("quantity {n} is out of range"))),
        Raw::Text(s) => s.parse().map_err(de::Error::custom),
    }
}

impl From<i32> for Millicores {
    fn from(v: i32) -> Self {
        Self(v)
    }
}

impl From<i32> for Mebibytes {
    fn from(v: i32) -> Self {
        Self(v)
    }
}

impl<'de> Deserialize<'de> for Millicores {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserialize_quantity(deserializer)
    }
}

impl<'de> Deserialize<'de> for Mebibytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserialize_quantity(deserializer)
    }
}

/// Declared range (and optional default) for one resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceBounds {
    pub min: i32,
    pub max: i32,
    #[serde(default)]
    pub default: Option<i32>,
}

impl ResourceBounds {
    pub const fn new(min: i32, max: i32) -> Self {
        Self {
            min,
            max,
            default: None,
        }
    }

    pub fn with_default(mut self, default: i32) -> Self {
        self.default = Some(default);
        self
    }

    /// Checks `min <= default <= max` and `min <= max`.
    pub fn validate(&self, resource: Resource) -> Result<(), ResourceLimitError> {
        if self.min < 0 {
            return Err(ResourceLimitError::InvalidBounds {
                resource,
                reason: format!("minimum {} is negative", self.min),
            });
        }
        if self.min > self.max {
            return Err(ResourceLimitError::InvalidBounds {
                resource,
                reason: format!("minimum {} exceeds maximum {}", self.min, self.max),
            });
        }
        match self.default {
            Some(default) if default < self.min || default > self.max => {
                Err(ResourceLimitError::InvalidBounds {
                    resource,
                    reason: format!(
                        "default {} lies outside [{}, {}]",
                        default, self.min, self.max
                    ),
                })
            }
            _ => Ok(()),
        }
    }

    /// Resolve a requested value against this range.
    pub fn clamp(&self, resource: Resource, requested: Option<i32>) -> Result<i32, ResourceLimitError> {
        let Some(value) = requested else {
            return Ok(self.default.unwrap_or(self.min));
        };
        if value < self.min {
            return Err(ResourceLimitError::BelowMin {
                resource,
                side: BoundSide::Min,
                bound: self.min,
                requested: value,
            });
        }
        if value > self.max {
            return Err(ResourceLimitError::AboveMax {
                resource,
                side: BoundSide::Max,
                bound: self.max,
                requested: value,
            });
        }
        Ok(value)
    }
}

/// Resource bounds declared by a plugin.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginResourceLimits {
    #[serde(default = "default_cpu_bounds")]
    pub cpu: ResourceBounds,
    #[serde(default = "default_memory_bounds")]
    pub memory: ResourceBounds,
    #[serde(default = "default_gpu_bounds")]
    pub gpu: ResourceBounds,
    #[serde(default = "default_worker_bounds")]
    pub workers: ResourceBounds,
}

fn default_cpu_bounds() -> ResourceBounds {
    ResourceBounds::new(DEFAULT_MIN_CPU, UNBOUNDED)
}
fn default_memory_bounds() -> ResourceBounds {
    ResourceBounds::new(DEFAULT_MIN_MEMORY, UNBOUNDED)
}
fn default_gpu_bounds() -> ResourceBounds {
    ResourceBounds::new(DEFAULT_MIN_GPU, UNBOUNDED)
}
fn default_worker_bounds() -> ResourceBounds {
    ResourceBounds::new(DEFAULT_MIN_WORKERS, UNBOUNDED)
}

impl Default for PluginResourceLimits {
    fn default() -> Self {
        Self {
            cpu: default_cpu_bounds(),
            memory: default_memory_bounds(),
            gpu: default_gpu_bounds(),
            workers: default_worker_bounds(),
        }
    }
}

impl PluginResourceLimits {
    pub fn validate(&self) -> Result<(), ResourceLimitError> {
        self.cpu.validate(Resource::CpuLimit)?;
        self.memory.validate(Resource::MemoryLimit)?;
        self.gpu.validate(Resource::GpuLimit)?;
        self.workers.validate(Resource::NumberOfWorkers)
    }

    /// Resolve a request into the limits an instance will run with.
    pub fn clamp(&self, request: &ResourceRequest) -> Result<EffectiveResources, ResourceLimitError> {
        Ok(EffectiveResources {
            cpu_limit: Millicores(
                self.cpu
                    .clamp(Resource::CpuLimit, request.cpu_limit.map(|c| c.0))?,
            ),
            memory_limit: Mebibytes(
                self.memory
                    .clamp(Resource::MemoryLimit, request.memory_limit.map(|m| m.0))?,
            ),
            gpu_limit: self.gpu.clamp(Resource::GpuLimit, request.gpu_limit)?,
            number_of_workers: self
                .workers
                .clamp(Resource::NumberOfWorkers, request.number_of_workers)?,
        })
    }
}

/// What a client asked for. Absent fields fall back to plugin defaults.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequest {
    #[serde(default)]
    pub cpu_limit: Option<Millicores>,
    #[serde(default)]
    pub memory_limit: Option<Mebibytes>,
    #[serde(default)]
    pub gpu_limit: Option<i32>,
    #[serde(default)]
    pub number_of_workers: Option<i32>,
}

/// Limits after policy resolution. Every field is within the plugin's bounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveResources {
    pub cpu_limit: Millicores,
    pub memory_limit: Mebibytes,
    pub gpu_limit: i32,
    pub number_of_workers: i32,
}

impl From<EffectiveResources> for ResourceRequest {
    fn from(effective: EffectiveResources) -> Self {
        Self {
            cpu_limit: Some(effective.cpu_limit),
            memory_limit: Some(effective.memory_limit),
            gpu_limit: Some(effective.gpu_limit),
            number_of_workers: Some(effective.number_of_workers),
        }
    }
}
