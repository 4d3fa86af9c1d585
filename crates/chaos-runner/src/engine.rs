//! Engine activation context
//!
//! [`EngineContext`] is the read-only view of one `ChaosEngine` activation
//! that the rest of the pipeline works from.

use k8s_openapi::api::core::v1::ObjectReference;
use kube::{Resource, ResourceExt};
use tracing::warn;

use chaos_common::crd::{
    ApplicationParams, ChaosEngine, CleanupPolicy, ExperimentComponents, ExperimentList,
};
use chaos_common::retry::{retry_with_backoff_if, RetryConfig};

use crate::client::ChaosKubeClient;
use crate::error::RunnerError;

/// One engine activation
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EngineContext {
    /// Engine name
    pub name: String,
    /// Namespace of the engine and of every resource the run touches
    pub namespace: String,
    /// Engine UID, propagated as `CHAOS_UID`
    pub uid: String,
    /// Target application selector
    pub app: ApplicationParams,
    /// `auxiliaryAppInfo`, passed through verbatim
    pub auxiliary_app_info: String,
    /// `annotationCheck` as written on the engine
    pub annotation_check: String,
    /// Service account the experiment pods run as
    pub service_account: String,
    /// Experiment names in run order, without duplicates
    pub experiments: Vec<String>,
    /// What happens to a finished Job
    pub cleanup_policy: CleanupPolicy,
    /// Per-experiment overrides as listed on the engine
    pub overrides: Vec<ExperimentList>,
    /// Reference used to attach Events to the engine
    pub reference: ObjectReference,
}

impl EngineContext {
    /// Build the context from a fetched engine
    pub fn from_engine(engine: &ChaosEngine) -> Result<Self, RunnerError> {
        let name = engine.name_any();
        let namespace = engine.namespace().ok_or_else(|| {
            chaos_common::Error::validation_for(&name, "ChaosEngine must be namespaced")
        })?;
        let uid = engine
            .uid()
            .ok_or_else(|| chaos_common::Error::validation_for(&name, "ChaosEngine has no UID"))?;

        let spec = &engine.spec;
        let names = spec.experiments.iter().map(|e| e.name.clone()).collect();

        Ok(Self {
            experiments: dedupe_experiments(&name, names),
            uid,
            app: spec.appinfo.clone(),
            auxiliary_app_info: spec.auxiliary_app_info.clone().unwrap_or_default(),
            annotation_check: spec.annotation_check.clone(),
            service_account: spec.chaos_service_account.clone(),
            cleanup_policy: spec.job_clean_up_policy,
            overrides: spec.experiments.clone(),
            reference: engine.object_ref(&()),
            name,
            namespace,
        })
    }

    /// Fetch the engine and build its context
    pub async fn load(
        client: &dyn ChaosKubeClient,
        name: &str,
        namespace: &str,
        retry: &RetryConfig,
    ) -> Result<Self, RunnerError> {
        let engine = retry_with_backoff_if(
            retry,
            "get_engine",
            RunnerError::is_transient,
            || client.get_engine(name, namespace),
        )
        .await?
        .ok_or_else(|| RunnerError::EngineNotFound {
            name: name.to_string(),
            namespace: namespace.to_string(),
        })?;

        Self::from_engine(&engine)
    }

    /// Restrict the run to an explicit experiment list
    pub fn with_experiments(mut self, names: Vec<String>) -> Self {
        self.experiments = dedupe_experiments(&self.name, names);
        self
    }

    /// Engine override components for the named experiment
    pub fn overrides_for(&self, experiment: &str) -> Option<&ExperimentComponents> {
        self.overrides
            .iter()
            .find(|e| e.name == experiment)
            .map(|e| &e.spec.components)
    }
}

/// Status records are keyed by name, so each name may run once per activation.
fn dedupe_experiments(engine: &str, names: Vec<String>) -> Vec<String> {
    let mut unique: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        let name = name.trim().to_string();
        if name.is_empty() {
            continue;
        }
        if unique.contains(&name) {
            warn!(engine = %engine, experiment = %name, "duplicate experiment name ignored");
            continue;
        }
        unique.push(name);
    }
    unique
}
