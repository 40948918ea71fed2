use serde::Deserialize;

/// App-level MQ configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct MqAppConfig {
    /// Whether MQ is enabled. When disabled, jobs and status events stay in-process.
    #[serde(default = "default_mq_enabled")]
    pub enabled: bool,
    /// Redis connection URL. Default: "redis://localhost:6379".
    #[serde(default = "default_mq_url")]
    pub url: String,
    /// Connection pool size. Default: 5.
    #[serde(default = "default_mq_pool_size")]
    pub pool_size: u8,
    /// Queue the engine publishes plugin jobs to. Default: "plugin_jobs".
    #[serde(default = "default_job_queue")]
    pub job_queue: String,
    /// Queue the execution backend reports to. Default: "execution_reports".
    #[serde(default = "default_report_queue")]
    pub report_queue: String,
    /// Queue status notifications are published to. Default: "instance_status".
    #[serde(default = "default_status_queue")]
    pub status_queue: String,
}

fn default_mq_enabled() -> bool {
    true
}
fn default_mq_url() -> String {
    "redis://localhost:6379".into()
}
fn default_mq_pool_size() -> u8 {
    5
}
fn default_job_queue() -> String {
    "plugin_jobs".into()
}
fn default_report_queue() -> String {
    "execution_reports".into()
}
fn default_status_queue() -> String {
    "instance_status".into()
}

impl Default for MqAppConfig {
    fn default() -> Self {
        Self {
            enabled: default_mq_enabled(),
            url: default_mq_url(),
            pool_size: default_mq_pool_size(),
            job_queue: default_job_queue(),
            report_queue: default_report_queue(),
            status_queue: default_status_queue(),
        }
    }
}
