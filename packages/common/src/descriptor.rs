use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::parameter::{ParameterKind, ParameterValue};
use crate::resources::{PluginResourceLimits, ResourceLimitError};

/// Kind of plugin, which decides how instances chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginType {
    /// Feed synthesis: starts a new feed, never has a previous instance.
    Fs,
    /// Data synthesis: consumes the output of exactly one previous instance.
    Ds,
    /// Topology: may combine several instances, previous is optional.
    Ts,
}

impl PluginType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fs => "fs",
            Self::Ds => "ds",
            Self::Ts => "ts",
        }
    }
}

impl fmt::Display for PluginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PluginType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fs" => Ok(Self::Fs),
            "ds" => Ok(Self::Ds),
            "ts" => Ok(Self::Ts),
            _ => Err(format!("Invalid plugin type '{}'. Must be 'fs', 'ds' or 'ts'", s)),
        }
    }
}

/// One declared command-line parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub flag: String,
    #[serde(rename = "type")]
    pub kind: ParameterKind,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default = "default_action")]
    pub action: String,
    #[serde(default)]
    pub help: Option<String>,
}

fn default_action() -> String {
    "store".into()
}

fn default_compute_resource() -> String {
    "host".into()
}

/// Plugin descriptor as published by plugin authors (`plugin.toml` or JSON).
///
/// Use [`PluginDescriptor::from_toml`] or [`PluginDescriptor::from_json`]; both
/// reject descriptors missing any required descriptive field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub license: String,
    #[serde(rename = "type", default)]
    pub plugin_type: Option<PluginType>,
    #[serde(default)]
    pub authors: Option<String>,
    #[serde(default)]
    pub documentation: Option<String>,
    /// Executable the backend launches, forwarded untouched.
    #[serde(default)]
    pub selfexec: Option<String>,
    /// Interpreter used to launch `selfexec`, forwarded untouched.
    #[serde(default)]
    pub execshell: Option<String>,
    #[serde(default = "default_compute_resource")]
    pub compute_resource: String,
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
    #[serde(default)]
    pub resources: PluginResourceLimits,
}

#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("descriptor for '{name}' does not define: {}", missing.join(", "))]
    MissingFields {
        name: String,
        missing: Vec<&'static str>,
    },
    #[error("parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },
    #[error("parameter '{0}' is declared more than once")]
    DuplicateParameter(String),
    #[error(transparent)]
    Resources(#[from] ResourceLimitError),
    #[error("invalid descriptor syntax: {0}")]
    Syntax(String),
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl PluginDescriptor {
    pub fn from_toml(content: &str) -> Result<Self, DescriptorError> {
        let descriptor: Self =
            toml::from_str(content).map_err(|e| DescriptorError::Syntax(e.to_string()))?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    pub fn from_json(value: Value) -> Result<Self, DescriptorError> {
        let descriptor: Self =
            serde_json::from_value(value).map_err(|e| DescriptorError::Syntax(e.to_string()))?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Declared plugin type. Only meaningful after [`validate`](Self::validate) succeeded.
    pub fn kind(&self) -> PluginType {
        self.plugin_type.unwrap_or(PluginType::Ds)
    }

    pub fn validate(&self) -> Result<(), DescriptorError> {
        let mut missing = Vec::new();
        if self.name.trim().is_empty() {
            missing.push("name");
        }
        if self.version.trim().is_empty() {
            missing.push("version");
        }
        if self.title.trim().is_empty() {
            missing.push("title");
        }
        if self.description.trim().is_empty() {
            missing.push("description");
        }
        if self.plugin_type.is_none() {
            missing.push("type");
        }
        if self.license.trim().is_empty() {
            missing.push("license");
        }
        if !missing.is_empty() {
            return Err(DescriptorError::MissingFields {
                name: self.name.clone(),
                missing,
            });
        }

        let mut seen = HashSet::new();
        for param in &self.parameters {
            if !seen.insert(param.name.as_str()) {
                return Err(DescriptorError::DuplicateParameter(param.name.clone()));
            }
            param.validate()?;
        }

        self.resources.validate()?;
        Ok(())
    }
}

impl ParameterSpec {
    fn validate(&self) -> Result<(), DescriptorError> {
        let invalid = |reason: String| DescriptorError::InvalidParameter {
            name: self.name.clone(),
            reason,
        };

        if self.name.trim().is_empty() {
            return Err(invalid("name must not be empty".into()));
        }
        if !self.flag.starts_with('-') {
            return Err(invalid(format!("flag '{}' must start with '-'", self.flag)));
        }

        match (&self.default, self.optional) {
            (Some(Value::Null), _) | (None, _) => Ok(()),
            (Some(_), false) => Err(invalid("required parameters cannot declare a default".into())),
            (Some(default), true) => ParameterValue::parse(self.kind, default)
                .map(|_| ())
                .map_err(|e| invalid(format!("default value is invalid: {e}"))),
        }
    }

    /// The declared default, if any, as a typed value.
    pub fn default_value(&self) -> Option<ParameterValue> {
        match &self.default {
            None | Some(Value::Null) => None,
            Some(raw) => ParameterValue::parse(self.kind, raw).ok(),
        }
    }
}
