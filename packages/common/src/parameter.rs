#[cfg(feature = "sea-orm")]
use sea_orm::prelude::StringLen;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Maximum length of a `string` parameter value.
pub const MAX_STRING_LEN: usize = 600;
/// Maximum length of a `path` or `unextpath` parameter value.
pub const MAX_PATH_LEN: usize = 16000;

/// Declared type of a plugin parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(
    feature = "sea-orm",
    derive(sea_orm::DeriveActiveEnum, sea_orm::EnumIter),
    sea_orm(rs_type = "String", db_type = "String(StringLen::None)")
)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "string"))]
    #[serde(alias = "str")]
    String,
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "integer"))]
    #[serde(alias = "int")]
    Integer,
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "float"))]
    Float,
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "boolean"))]
    #[serde(alias = "bool")]
    Boolean,
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "path"))]
    Path,
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "unextpath"))]
    Unextpath,
}

impl ParameterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Path => "path",
            Self::Unextpath => "unextpath",
        }
    }

    pub const ALL: &'static [ParameterKind] = &[
        Self::String,
        Self::Integer,
        Self::Float,
        Self::Boolean,
        Self::Path,
        Self::Unextpath,
    ];
}

impl fmt::Display for ParameterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParameterKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" | "str" => Ok(Self::String),
            "integer" | "int" => Ok(Self::Integer),
            "float" => Ok(Self::Float),
            "boolean" | "bool" => Ok(Self::Boolean),
            "path" => Ok(Self::Path),
            "unextpath" => Ok(Self::Unextpath),
            _ => Err(format!(
                "Invalid parameter type '{}'. Valid values: {}",
                s,
                ParameterKind::ALL
                    .iter()
                    .map(|k| k.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
        }
    }
}

/// A typed parameter value. The variant always agrees with the declared [`ParameterKind`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ParameterValue {
    String(String),
    Integer(i32),
    Float(f64),
    Boolean(bool),
    Path(String),
    Unextpath(String),
}

impl ParameterValue {
    pub fn kind(&self) -> ParameterKind {
        match self {
            Self::String(_) => ParameterKind::String,
            Self::Integer(_) => ParameterKind::Integer,
            Self::Float(_) => ParameterKind::Float,
            Self::Boolean(_) => ParameterKind::Boolean,
            Self::Path(_) => ParameterKind::Path,
            Self::Unextpath(_) => ParameterKind::Unextpath,
        }
    }

    /// Plain JSON form of the payload, without the kind tag.
    pub fn to_json(&self) -> Value {
        match self {
            Self::String(s) | Self::Path(s) | Self::Unextpath(s) => Value::String(s.clone()),
            Self::Integer(i) => Value::from(*i),
            Self::Float(f) => Value::from(*f),
            Self::Boolean(b) => Value::Bool(*b),
        }
    }

    /// Parse and validate a raw JSON value against a declared kind.
    pub fn parse(kind: ParameterKind, raw: &Value) -> Result<Self, ParameterError> {
        match kind {
            ParameterKind::String => {
                let s = expect_str(kind, raw)?;
                if s.chars().count() > MAX_STRING_LEN {
                    return Err(ParameterError::TooLong {
                        max: MAX_STRING_LEN,
                    });
                }
                Ok(Self::String(s.to_string()))
            }
            ParameterKind::Integer => {
                let n = raw
                    .as_i64()
                    .ok_or_else(|| ParameterError::type_mismatch(kind, raw))?;
                let n = i32::try_from(n).map_err(|_| ParameterError::OutOfRange(n.to_string()))?;
                Ok(Self::Integer(n))
            }
            ParameterKind::Float => {
                let f = raw
                    .as_f64()
                    .ok_or_else(|| ParameterError::type_mismatch(kind, raw))?;
                if !f.is_finite() {
                    return Err(ParameterError::OutOfRange(f.to_string()));
                }
                Ok(Self::Float(f))
            }
            ParameterKind::Boolean => raw
                .as_bool()
                .map(Self::Boolean)
                .ok_or_else(|| ParameterError::type_mismatch(kind, raw)),
            ParameterKind::Path => {
                let s = expect_str(kind, raw)?;
                validate_path_list(s, false)?;
                Ok(Self::Path(s.to_string()))
            }
            ParameterKind::Unextpath => {
                let s = expect_str(kind, raw)?;
                validate_path_list(s, true)?;
                Ok(Self::Unextpath(s.to_string()))
            }
        }
    }
}

fn expect_str(kind: ParameterKind, raw: &Value) -> Result<&str, ParameterError> {
    raw.as_str()
        .ok_or_else(|| ParameterError::type_mismatch(kind, raw))
}

/// Reasons a raw value cannot be bound to a parameter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParameterError {
    #[error("expected a {expected} value, got {actual}")]
    TypeMismatch {
        expected: ParameterKind,
        actual: &'static str,
    },
    #[error("value exceeds maximum length of {max} characters")]
    TooLong { max: usize },
    #[error("value {0} is out of range")]
    OutOfRange(String),
    #[error("path list must not be empty")]
    EmptyPath,
    #[error("path entry must not contain NUL or control characters")]
    ControlCharacter,
    #[error("path entry '{0}' escapes the permitted root")]
    PathTraversal(String),
}

impl ParameterError {
    fn type_mismatch(expected: ParameterKind, raw: &Value) -> Self {
        let actual = match raw {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
            Value::Number(_) => "float",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        };
        Self::TypeMismatch { expected, actual }
    }
}

/// Validates a comma-separated list of storage paths.
///
/// With `confined` set, entries that are absolute or climb out through `..`
/// are rejected. Nothing is checked against the filesystem.
pub fn validate_path_list(value: &str, confined: bool) -> Result<(), ParameterError> {
    if value.chars().count() > MAX_PATH_LEN {
        return Err(ParameterError::TooLong { max: MAX_PATH_LEN });
    }

    let entries: Vec<&str> = value.split(',').map(str::trim).collect();
    if entries.iter().all(|e| e.is_empty()) {
        return Err(ParameterError::EmptyPath);
    }

    for entry in entries {
        if entry.is_empty() {
            return Err(ParameterError::EmptyPath);
        }
        if entry.chars().any(|c| c.is_control()) {
            return Err(ParameterError::ControlCharacter);
        }
        if confined && escapes_root(entry) {
            return Err(ParameterError::PathTraversal(entry.to_string()));
        }
    }

    Ok(())
}

/// Checks if a path is absolute or contains a `..` segment.
pub fn escapes_root(path: &str) -> bool {
    if path.starts_with('/') || path.starts_with('\\') {
        return true;
    }
    path.split(['/', '\\']).any(|segment| segment == "..")
}
