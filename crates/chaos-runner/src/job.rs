//! Experiment Job construction and submission
//!
//! Each experiment runs as one `batch/v1` Job with a single container named
//! after the experiment. The Job never retries (`backoffLimit: 0`) and its
//! pod never restarts; the experiment itself owns retries of chaos actions.

use std::collections::BTreeMap;

use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, HostPathVolumeSource, PodSpec, PodTemplateSpec,
    SecretVolumeSource, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::info;

use chaos_common::CHAOS_UID_LABEL;

use crate::client::{ChaosKubeClient, JOB_NAME_LABEL};
use crate::dependencies::{MountDescriptor, MountSource};
use crate::engine::EngineContext;
use crate::error::RunnerError;
use crate::resolver::ExperimentContext;

const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
const MANAGED_BY: &str = "chaos-runner";

/// Labels shared by the Job and its pod template.
///
/// Experiment labels are applied last but cannot replace the `job-name` or
/// `chaosUID` selectors the runner relies on.
fn job_labels(ctx: &ExperimentContext, engine: &EngineContext) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert("name".to_string(), ctx.name.clone());
    labels.insert(MANAGED_BY_LABEL.to_string(), MANAGED_BY.to_string());
    labels.extend(ctx.labels.clone());
    labels.insert(JOB_NAME_LABEL.to_string(), ctx.job_name.clone());
    labels.insert(CHAOS_UID_LABEL.to_string(), engine.uid.clone());
    labels
}

fn volume(mount: &MountDescriptor) -> Volume {
    let name = mount.volume_name();
    match &mount.source {
        MountSource::ConfigMap => Volume {
            name,
            config_map: Some(ConfigMapVolumeSource {
                name: mount.name.clone(),
                ..Default::default()
            }),
            ..Default::default()
        },
        MountSource::Secret => Volume {
            name,
            secret: Some(SecretVolumeSource {
                secret_name: Some(mount.name.clone()),
                ..Default::default()
            }),
            ..Default::default()
        },
        MountSource::HostPath(path) => Volume {
            name,
            host_path: Some(HostPathVolumeSource {
                path: path.clone(),
                type_: None,
            }),
            ..Default::default()
        },
    }
}

fn volume_mount(mount: &MountDescriptor) -> VolumeMount {
    VolumeMount {
        name: mount.volume_name(),
        mount_path: mount.mount_path.clone(),
        ..Default::default()
    }
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    (!items.is_empty()).then_some(items)
}

fn non_empty_map(map: BTreeMap<String, String>) -> Option<BTreeMap<String, String>> {
    (!map.is_empty()).then_some(map)
}

/// Build the Job for a resolved experiment with its mounts attached
pub fn build_experiment_job(ctx: &ExperimentContext, engine: &EngineContext) -> Job {
    let labels = job_labels(ctx, engine);

    let container = Container {
        name: ctx.name.clone(),
        image: Some(ctx.image.clone()),
        image_pull_policy: ctx.image_pull_policy.clone(),
        command: non_empty(ctx.command.clone()),
        args: non_empty(ctx.args.clone()),
        env: non_empty(ctx.env_vars()),
        resources: ctx.resources.clone(),
        security_context: ctx.container_security_context.clone(),
        volume_mounts: non_empty(ctx.mounts.iter().map(volume_mount).collect()),
        ..Default::default()
    };

    let pod_spec = PodSpec {
        containers: vec![container],
        restart_policy: Some("Never".to_string()),
        service_account_name: (!ctx.service_account.is_empty())
            .then(|| ctx.service_account.clone()),
        host_pid: ctx.host_pid.then_some(true),
        node_selector: non_empty_map(ctx.node_selector.clone()),
        tolerations: non_empty(ctx.tolerations.clone()),
        image_pull_secrets: non_empty(ctx.image_pull_secrets.clone()),
        security_context: ctx.pod_security_context.clone(),
        volumes: non_empty(ctx.mounts.iter().map(volume).collect()),
        ..Default::default()
    };

    Job {
        metadata: ObjectMeta {
            name: Some(ctx.job_name.clone()),
            namespace: Some(ctx.namespace.clone()),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(JobSpec {
            backoff_limit: Some(0),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    annotations: non_empty_map(ctx.annotations.clone()),
                    ..Default::default()
                }),
                spec: Some(pod_spec),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Submit the experiment Job. Submission is not retried.
pub async fn launch(client: &dyn ChaosKubeClient, job: &Job) -> Result<(), RunnerError> {
    client.create_job(job).await?;
    info!(
        job = %job.metadata.name.as_deref().unwrap_or_default(),
        namespace = %job.metadata.namespace.as_deref().unwrap_or_default(),
        "experiment job created"
    );
    Ok(())
}

/// Number of active pods the Job controller reports
pub fn active_count(job: &Job) -> i32 {
    job.status.as_ref().and_then(|s| s.active).unwrap_or(0)
}

/// Check whether the Job reached a `Complete` or `Failed` condition or
/// already has a terminated pod
pub fn is_job_finished(job: &Job) -> bool {
    let Some(status) = job.status.as_ref() else {
        return false;
    };
    let terminated = status.succeeded.unwrap_or(0) + status.failed.unwrap_or(0) > 0;
    terminated
        || status
            .conditions
            .as_ref()
            .map(|conditions| {
                conditions
                    .iter()
                    .any(|c| (c.type_ == "Complete" || c.type_ == "Failed") && c.status == "True")
            })
            .unwrap_or(false)
}
