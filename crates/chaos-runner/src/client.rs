//! Kubernetes access for the runner
//!
//! Every API call the runner makes goes through [`ChaosKubeClient`], so the
//! resolver, watcher and status reconciler can be tested against a mock.

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Secret};
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams, PropagationPolicy};
use kube::Client;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use chaos_common::crd::{ChaosEngine, ChaosEngineStatus, ChaosExperiment, ChaosResult};
use chaos_common::kube_utils::{is_conflict, is_not_found};
use chaos_common::FIELD_MANAGER;

use crate::error::RunnerError;

/// Label the Job controller puts on the pods of a Job
pub const JOB_NAME_LABEL: &str = "job-name";

/// Outcome of a guarded status write
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusWrite {
    /// The write was accepted
    Applied,
    /// The engine changed since it was read; re-read and retry
    Conflict,
}

/// Trait abstracting the Kubernetes operations of one engine activation
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChaosKubeClient: Send + Sync {
    /// Get a ChaosEngine by name and namespace
    async fn get_engine(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<ChaosEngine>, RunnerError>;

    /// Write the engine status, guarded by the resourceVersion it was read at
    async fn write_engine_status(
        &self,
        name: &str,
        namespace: &str,
        resource_version: Option<String>,
        status: &ChaosEngineStatus,
    ) -> Result<StatusWrite, RunnerError>;

    /// Get a ChaosExperiment by name and namespace
    async fn get_experiment(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<ChaosExperiment>, RunnerError>;

    /// Get a ChaosResult by name and namespace
    async fn get_result(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<ChaosResult>, RunnerError>;

    /// Check whether a ConfigMap exists
    async fn config_map_exists(&self, name: &str, namespace: &str) -> Result<bool, RunnerError>;

    /// Check whether a Secret exists
    async fn secret_exists(&self, name: &str, namespace: &str) -> Result<bool, RunnerError>;

    /// Submit an experiment Job
    async fn create_job(&self, job: &Job) -> Result<(), RunnerError>;

    /// Get a Job by name and namespace
    async fn get_job(&self, name: &str, namespace: &str) -> Result<Option<Job>, RunnerError>;

    /// List the pods created for a Job
    async fn list_job_pods(&self, job_name: &str, namespace: &str) -> Result<Vec<Pod>, RunnerError>;

    /// Delete a Job and its pods (foreground propagation)
    async fn delete_job(&self, name: &str, namespace: &str) -> Result<(), RunnerError>;
}

/// Real Kubernetes client implementation
pub struct KubeChaosClient {
    client: Client,
}

impl KubeChaosClient {
    /// Wrap a kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ChaosKubeClient for KubeChaosClient {
    async fn get_engine(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<ChaosEngine>, RunnerError> {
        let api: Api<ChaosEngine> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn write_engine_status(
        &self,
        name: &str,
        namespace: &str,
        resource_version: Option<String>,
        status: &ChaosEngineStatus,
    ) -> Result<StatusWrite, RunnerError> {
        let api: Api<ChaosEngine> = Api::namespaced(self.client.clone(), namespace);

        // A merge patch carrying metadata.resourceVersion is rejected with 409
        // if the object has moved on since that version was read.
        let status = serde_json::to_value(status)?;
        let mut patch = serde_json::json!({ "status": status });
        if let Some(rv) = resource_version {
            patch["metadata"] = serde_json::json!({ "resourceVersion": rv });
        }

        match api
            .patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => Ok(StatusWrite::Applied),
            Err(e) if is_conflict(&e) => {
                debug!(engine = %name, "engine status write conflicted");
                Ok(StatusWrite::Conflict)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_experiment(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<ChaosExperiment>, RunnerError> {
        let api: Api<ChaosExperiment> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn get_result(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<ChaosResult>, RunnerError> {
        let api: Api<ChaosResult> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn config_map_exists(&self, name: &str, namespace: &str) -> Result<bool, RunnerError> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        match api.get_metadata(name).await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn secret_exists(&self, name: &str, namespace: &str) -> Result<bool, RunnerError> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        match api.get_metadata(name).await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_job(&self, job: &Job) -> Result<(), RunnerError> {
        let namespace = job.metadata.namespace.as_deref().unwrap_or("default");
        let job_name = job.metadata.name.clone().unwrap_or_default();
        let api: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        api.create(&PostParams::default(), job)
            .await
            .map_err(|source| RunnerError::Launch {
                job: job_name,
                source,
            })?;
        Ok(())
    }

    async fn get_job(&self, name: &str, namespace: &str) -> Result<Option<Job>, RunnerError> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn list_job_pods(
        &self,
        job_name: &str,
        namespace: &str,
    ) -> Result<Vec<Pod>, RunnerError> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = ListParams::default().labels(&format!("{}={}", JOB_NAME_LABEL, job_name));
        Ok(api.list(&params).await?.items)
    }

    async fn delete_job(&self, name: &str, namespace: &str) -> Result<(), RunnerError> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        let dp = DeleteParams {
            propagation_policy: Some(PropagationPolicy::Foreground),
            ..Default::default()
        };
        match api.delete(name, &dp).await {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
