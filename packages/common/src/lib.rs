pub mod config;
pub mod descriptor;
pub mod event;
pub mod execution_report;
pub mod instance_status;
pub mod mq;
pub mod parameter;
pub mod plugin_job;
pub mod resources;
pub mod retry;

pub use descriptor::{DescriptorError, ParameterSpec, PluginDescriptor, PluginType};
pub use instance_status::{InstanceErrorCode, InstanceStatus};
pub use parameter::{ParameterError, ParameterKind, ParameterValue};
pub use resources::{
    EffectiveResources, Mebibytes, Millicores, PluginResourceLimits, ResourceBounds,
    ResourceLimitError, ResourceRequest,
};
