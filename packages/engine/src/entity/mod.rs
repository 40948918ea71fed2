pub mod compute_resource;
pub mod parameter_binding;
pub mod plugin;
pub mod plugin_instance;
pub mod plugin_instance_lock;
pub mod plugin_instance_split;
pub mod plugin_parameter;
