use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::mq::Message;
use crate::parameter::ParameterValue;
use crate::resources::EffectiveResources;

/// A bound parameter ready to be rendered on the plugin command line.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobArgument {
    pub name: String,
    pub flag: String,
    /// Declared action, e.g. "store" or "store_true".
    pub action: String,
    pub value: ParameterValue,
}

impl JobArgument {
    /// Command-line tokens for this argument.
    ///
    /// Boolean switches declared with `store_true`/`store_false` render as a
    /// bare flag only when set away from their implicit default.
    pub fn to_args(&self) -> Vec<String> {
        match (&self.value, self.action.as_str()) {
            (ParameterValue::Boolean(set), "store_true") => {
                if *set { vec![self.flag.clone()] } else { Vec::new() }
            }
            (ParameterValue::Boolean(set), "store_false") => {
                if *set { Vec::new() } else { vec![self.flag.clone()] }
            }
            (value, _) => vec![self.flag.clone(), render(value)],
        }
    }
}

fn render(value: &ParameterValue) -> String {
    match value {
        ParameterValue::String(s) | ParameterValue::Path(s) | ParameterValue::Unextpath(s) => {
            s.clone()
        }
        ParameterValue::Integer(i) => i.to_string(),
        ParameterValue::Float(f) => f.to_string(),
        ParameterValue::Boolean(b) => b.to_string(),
    }
}

/// A job message sent to the execution backend queue.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PluginJob {
    /// Job identifier (UUID)
    pub job_id: String,
    pub instance_id: i32,
    pub plugin_name: String,
    pub plugin_version: String,
    pub selfexec: Option<String>,
    pub execshell: Option<String>,
    /// Name of the compute resource the job must run on
    pub compute_resource: String,
    /// Output folder of the previous instance, if any
    pub input_folder: Option<String>,
    pub output_folder: String,
    pub resources: EffectiveResources,
    pub arguments: Vec<JobArgument>,
}

impl PluginJob {
    /// Create a new plugin job with a generated UUID.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        instance_id: i32,
        plugin_name: String,
        plugin_version: String,
        selfexec: Option<String>,
        execshell: Option<String>,
        compute_resource: String,
        input_folder: Option<String>,
        output_folder: String,
        resources: EffectiveResources,
        arguments: Vec<JobArgument>,
    ) -> Self {
        Self {
            job_id: Uuid::new_v4().to_string(),
            instance_id,
            plugin_name,
            plugin_version,
            selfexec,
            execshell,
            compute_resource,
            input_folder,
            output_folder,
            resources,
            arguments,
        }
    }

    /// Full argument vector, flags in declaration order.
    pub fn command_args(&self) -> Vec<String> {
        self.arguments.iter().flat_map(JobArgument::to_args).collect()
    }
}

impl Message for PluginJob {
    fn message_type() -> &'static str {
        "plugin_job"
    }

    fn message_id(&self) -> &str {
        &self.job_id
    }
}
