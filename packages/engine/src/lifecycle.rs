use chrono::Utc;
use common::execution_report::{ExecutionEvent, ExecutionReport};
use common::plugin_job::{JobArgument, PluginJob};
use common::{EffectiveResources, InstanceErrorCode, InstanceStatus, Mebibytes, Millicores};
use sea_orm::{ColumnTrait, DbErr, EntityTrait, IntoActiveModel, QueryFilter, Set};
use tracing::{error, info, warn};

use crate::engine::Engine;
use crate::entity::{compute_resource, plugin, plugin_instance};
use crate::error::EngineError;
use crate::entity::plugin_instance_lock;
use crate::lock::{ensure_held, with_lock};
use crate::params::ParameterStore;
use crate::storage::OutputFile;

pub const MAX_SUMMARY_LEN: usize = 4000;

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Sum of file sizes, saturating at `i64::MAX`.
fn total_size(files: &[OutputFile]) -> i64 {
    files.iter().fold(0i64, |acc, f| {
        acc.saturating_add(i64::try_from(f.size).unwrap_or(i64::MAX))
    })
}

impl Engine {
    /// `waiting -> scheduled`: assign the plugin's compute resource and hand
    /// the job to the execution backend.
    pub async fn schedule(&self, instance_id: i32) -> Result<plugin_instance::Model, EngineError> {
        with_lock(self.db(), instance_id, self.holder(), |lock| async move {
            let instance = self.instance(instance_id).await?;
            if instance.status != InstanceStatus::Waiting {
                return Err(EngineError::transition(
                    instance_id,
                    instance.status,
                    InstanceStatus::Scheduled,
                ));
            }

            let (plugin, resource) = plugin::Entity::find_by_id(instance.plugin_id)
                .find_also_related(compute_resource::Entity)
                .one(self.db())
                .await?
                .ok_or_else(|| EngineError::NotFound(format!("plugin {}", instance.plugin_id)))?;
            let resource = resource.ok_or_else(|| {
                EngineError::NotFound(format!("compute resource {}", plugin.compute_resource_id))
            })?;

            let job = self.build_job(&instance, &plugin, &resource).await?;
            let scheduled = self
                .apply(&lock, instance, InstanceStatus::Scheduled, |active| {
                    active.compute_resource_id = Set(Some(resource.id));
                })
                .await?;

            match self.dispatcher().dispatch(&job).await {
                Ok(()) => {
                    info!(
                        instance_id,
                        job_id = %job.job_id,
                        compute_resource = %resource.name,
                        "Dispatched plugin job"
                    );
                    Ok(scheduled)
                }
                Err(e) => {
                    error!(instance_id, error = %e, "Failed to dispatch plugin job");
                    let summary = truncate(&e.to_string(), MAX_SUMMARY_LEN);
                    self.apply(&lock, scheduled, InstanceStatus::FinishedWithError, |active| {
                        active.error_code = Set(Some(InstanceErrorCode::DISPATCH_FAILED.into()));
                        active.summary = Set(summary);
                    })
                    .await
                }
            }
        })
        .await
    }

    /// `scheduled -> started`.
    pub async fn mark_started(
        &self,
        instance_id: i32,
    ) -> Result<plugin_instance::Model, EngineError> {
        with_lock(self.db(), instance_id, self.holder(), |lock| async move {
            let instance = self.instance(instance_id).await?;
            self.apply(&lock, instance, InstanceStatus::Started, |_| {}).await
        })
        .await
    }

    /// The backend reported the job exited.
    ///
    /// On success the instance moves to `registeringFiles` and outputs are
    /// registered right away; if that second step cannot get the lock the
    /// scheduler picks it up later. An exit that overtakes its start report
    /// walks a `scheduled` instance through `started` under the same lock.
    pub async fn mark_exited(
        &self,
        instance_id: i32,
        success: bool,
        summary: &str,
        raw: &str,
    ) -> Result<plugin_instance::Model, EngineError> {
        let summary = truncate(summary, MAX_SUMMARY_LEN);
        let raw = raw.to_string();

        let instance = with_lock(self.db(), instance_id, self.holder(), |lock| async move {
            let mut instance = self.instance(instance_id).await?;
            if instance.status == InstanceStatus::Scheduled {
                warn!(instance_id, "Exit reported before start");
                instance = self
                    .apply(&lock, instance, InstanceStatus::Started, |_| {})
                    .await?;
            }
            if success {
                self.apply(&lock, instance, InstanceStatus::RegisteringFiles, |active| {
                    active.summary = Set(summary);
                    active.raw = Set(raw);
                })
                .await
            } else {
                self.apply(&lock, instance, InstanceStatus::FinishedWithError, |active| {
                    active.error_code = Set(Some(InstanceErrorCode::EXECUTION_FAILED.into()));
                    active.summary = Set(summary);
                    active.raw = Set(raw);
                })
                .await
            }
        })
        .await?;

        if instance.status != InstanceStatus::RegisteringFiles {
            return Ok(instance);
        }

        match self.register_files(instance_id).await {
            Err(EngineError::LockContention { .. }) => {
                warn!(instance_id, "Output registration deferred, instance is locked");
                Ok(instance)
            }
            other => other,
        }
    }

    /// `registeringFiles -> finishedSuccessfully`, or `finishedWithError` if
    /// the file index fails.
    pub async fn register_files(
        &self,
        instance_id: i32,
    ) -> Result<plugin_instance::Model, EngineError> {
        with_lock(self.db(), instance_id, self.holder(), |lock| async move {
            let instance = self.instance(instance_id).await?;
            if instance.status != InstanceStatus::RegisteringFiles {
                return Err(EngineError::transition(
                    instance_id,
                    instance.status,
                    InstanceStatus::FinishedSuccessfully,
                ));
            }

            match self.file_index().register_outputs(&instance).await {
                Ok(files) => {
                    let size = instance.size.saturating_add(total_size(&files));
                    info!(instance_id, files = files.len(), size, "Registered output files");
                    self.apply(&lock, instance, InstanceStatus::FinishedSuccessfully, |active| {
                        active.size = Set(size);
                    })
                    .await
                }
                Err(e) => {
                    error!(instance_id, error = %e, "Output registration failed");
                    let summary = truncate(&e.to_string(), MAX_SUMMARY_LEN);
                    self.apply(&lock, instance, InstanceStatus::FinishedWithError, |active| {
                        active.error_code = Set(Some(InstanceErrorCode::STORAGE_FAILED.into()));
                        active.summary = Set(summary);
                    })
                    .await
                }
            }
        })
        .await
    }

    /// Any non-terminal status `-> finishedWithError` with a caller-chosen code.
    pub async fn fail(
        &self,
        instance_id: i32,
        error_code: &str,
        summary: &str,
    ) -> Result<plugin_instance::Model, EngineError> {
        if error_code.is_empty() || error_code.chars().count() > InstanceErrorCode::MAX_LEN {
            return Err(EngineError::Validation(format!(
                "error code '{error_code}' must be 1 to {} characters",
                InstanceErrorCode::MAX_LEN
            )));
        }
        let summary = truncate(summary, MAX_SUMMARY_LEN);

        with_lock(self.db(), instance_id, self.holder(), |lock| async move {
            let instance = self.instance(instance_id).await?;
            self.apply(&lock, instance, InstanceStatus::FinishedWithError, |active| {
                active.error_code = Set(Some(error_code.to_string()));
                active.summary = Set(summary);
            })
            .await
        })
        .await
    }

    /// Any non-terminal status `-> cancelled`. Fails with `LockContention`
    /// while another actor is mid-transition.
    pub async fn cancel(&self, instance_id: i32) -> Result<plugin_instance::Model, EngineError> {
        with_lock(self.db(), instance_id, self.holder(), |lock| async move {
            let instance = self.instance(instance_id).await?;
            self.apply(&lock, instance, InstanceStatus::Cancelled, |_| {}).await
        })
        .await
    }

    /// Entry point for backend reports.
    pub async fn ingest_report(
        &self,
        report: &ExecutionReport,
    ) -> Result<plugin_instance::Model, EngineError> {
        match &report.event {
            ExecutionEvent::Started => self.mark_started(report.instance_id).await,
            ExecutionEvent::Exited {
                success,
                summary,
                raw,
            } => {
                self.mark_exited(report.instance_id, *success, summary, raw)
                    .await
            }
        }
    }

    /// Write a legal transition under `lock`.
    ///
    /// The lock row must still exist and the update is conditional on the
    /// status read by the caller, so a writer whose lock was reaped gets
    /// `LockLost` and one that bypassed the lock gets a conflict.
    async fn apply<F>(
        &self,
        lock: &plugin_instance_lock::Model,
        instance: plugin_instance::Model,
        to: InstanceStatus,
        edit: F,
    ) -> Result<plugin_instance::Model, EngineError>
    where
        F: FnOnce(&mut plugin_instance::ActiveModel),
    {
        let from = instance.status;
        if !from.can_transition_to(to) {
            return Err(EngineError::transition(instance.id, from, to));
        }

        let instance_id = instance.id;
        ensure_held(self.db(), lock).await?;

        let mut active = instance.into_active_model();
        active.status = Set(to);
        if to.is_terminal() {
            active.end_date = Set(Some(Utc::now()));
        }
        edit(&mut active);

        let updated = plugin_instance::Entity::update(active)
            .validate()?
            .filter(plugin_instance::Column::Status.eq(from))
            .exec(self.db())
            .await
            .map_err(|e| match e {
                DbErr::RecordNotUpdated => EngineError::transition(instance_id, from, to),
                other => other.into(),
            })?;

        info!(instance_id, from = %from, to = %to, "Instance status changed");
        if to.is_notified() {
            self.notify(&updated).await;
        }
        Ok(updated)
    }

    async fn build_job(
        &self,
        instance: &plugin_instance::Model,
        plugin: &plugin::Model,
        resource: &compute_resource::Model,
    ) -> Result<PluginJob, EngineError> {
        let arguments = ParameterStore::new(self.db())
            .bindings(instance.id)
            .await?
            .into_iter()
            .map(|(param, value)| JobArgument {
                name: param.name,
                flag: param.flag,
                action: param.action,
                value,
            })
            .collect();

        let input_folder = match instance.previous_id {
            Some(previous_id) => plugin_instance::Entity::find_by_id(previous_id)
                .one(self.db())
                .await?
                .and_then(|previous| previous.output_folder),
            None => None,
        };

        let output_folder = instance.output_folder.clone().ok_or_else(|| {
            EngineError::StateConflict(format!("instance {} has no output folder", instance.id))
        })?;

        Ok(PluginJob::new(
            instance.id,
            plugin.name.clone(),
            plugin.version.clone(),
            plugin.selfexec.clone(),
            plugin.execshell.clone(),
            resource.name.clone(),
            input_folder,
            output_folder,
            EffectiveResources {
                cpu_limit: Millicores(instance.cpu_limit),
                memory_limit: Mebibytes(instance.memory_limit),
                gpu_limit: instance.gpu_limit,
                number_of_workers: instance.number_of_workers,
            },
            arguments,
        ))
    }
}
