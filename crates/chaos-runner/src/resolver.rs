//! Attribute resolution for one experiment
//!
//! [`resolve`] merges a ChaosExperiment definition with the engine's
//! per-experiment overrides into an [`ExperimentContext`]. It is a pure
//! function of its inputs apart from the job name, which the caller
//! generates once per experiment with [`generate_job_name`].
//!
//! Environment layering, last writer wins:
//! 1. definition `env`
//! 2. engine override `env`
//! 3. engine-derived entries (`CHAOSENGINE`, `CHAOS_UID`, ...)
//! 4. `STATUS_CHECK_DELAY` / `STATUS_CHECK_TIMEOUT`
//!
//! Every other attribute is overridden individually: an override that is
//! empty or unset leaves the definition's value in place.

use std::collections::BTreeMap;
use std::time::Duration;

use k8s_openapi::api::core::v1::{
    EnvVar, LocalObjectReference, PodSecurityContext, ResourceRequirements, SecurityContext,
    Toleration,
};
use rand::Rng;
use tracing::debug;

use chaos_common::crd::{ExperimentComponents, ExperimentDef};
use chaos_common::retry::{retry_with_backoff_if, RetryConfig};
use chaos_common::CHAOS_ANNOTATION_KEY;

use crate::client::ChaosKubeClient;
use crate::dependencies::Mounts;
use crate::engine::EngineContext;
use crate::error::RunnerError;

/// Status-check delay used when the engine sets none, in seconds
pub const DEFAULT_STATUS_CHECK_DELAY: u64 = 2;
/// Status-check timeout used when the engine sets none, in seconds
pub const DEFAULT_STATUS_CHECK_TIMEOUT: u64 = 180;

/// Lowercase consonants and digits without vowels or 0, 1, 3
const JOB_SUFFIX_ALPHABET: &[u8] = b"bcdfghjklmnpqrstvwxz2456789";
const JOB_SUFFIX_LEN: usize = 6;

/// Env keys the runner always sets, overriding any definition or engine value
pub mod env_keys {
    /// Engine name
    pub const CHAOSENGINE: &str = "CHAOSENGINE";
    /// Target application label selector
    pub const APP_LABEL: &str = "APP_LABEL";
    /// Target application namespace
    pub const APP_NAMESPACE: &str = "APP_NAMESPACE";
    /// Namespace the experiment runs in
    pub const CHAOS_NAMESPACE: &str = "CHAOS_NAMESPACE";
    /// Target application kind
    pub const APP_KIND: &str = "APP_KIND";
    /// Engine `auxiliaryAppInfo`
    pub const AUXILIARY_APPINFO: &str = "AUXILIARY_APPINFO";
    /// Engine UID
    pub const CHAOS_UID: &str = "CHAOS_UID";
    /// Experiment name
    pub const EXPERIMENT_NAME: &str = "EXPERIMENT_NAME";
    /// Annotation targets must carry
    pub const ANNOTATION_KEY: &str = "ANNOTATION_KEY";
    /// Whether targets are filtered by annotation
    pub const ANNOTATION_CHECK: &str = "ANNOTATION_CHECK";
    /// Engine `jobCleanUpPolicy`
    pub const JOB_CLEANUP_POLICY: &str = "JOB_CLEANUP_POLICY";
    /// Effective status-check delay, in seconds
    pub const STATUS_CHECK_DELAY: &str = "STATUS_CHECK_DELAY";
    /// Effective status-check timeout, in seconds
    pub const STATUS_CHECK_TIMEOUT: &str = "STATUS_CHECK_TIMEOUT";
}

/// Effective status-check timing for an experiment
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusCheck {
    /// Pause between application status checks
    pub delay: Duration,
    /// Give-up bound on application status checks
    pub timeout: Duration,
}

/// A fully resolved experiment, ready to be turned into a Job
///
/// Fields mirror the Job's pod template; empty collections and `None` are
/// left out of the generated Job.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExperimentContext {
    /// Experiment name
    pub name: String,
    /// Namespace the Job is created in
    pub namespace: String,
    /// `<experiment>-<suffix>`
    pub job_name: String,
    /// Container image, engine override first
    pub image: String,
    /// Container image pull policy
    pub image_pull_policy: Option<String>,
    /// Container command
    pub command: Vec<String>,
    /// Container args
    pub args: Vec<String>,
    /// Definition labels plus engine experiment labels
    pub labels: BTreeMap<String, String>,
    /// Pod annotations
    pub annotations: BTreeMap<String, String>,
    /// Pod node selector
    pub node_selector: BTreeMap<String, String>,
    /// Pod tolerations
    pub tolerations: Vec<Toleration>,
    /// Container resources
    pub resources: Option<ResourceRequirements>,
    /// Pod image pull secrets
    pub image_pull_secrets: Vec<LocalObjectReference>,
    /// Pod security context
    pub pod_security_context: Option<PodSecurityContext>,
    /// Container security context
    pub container_security_context: Option<SecurityContext>,
    /// Share the host PID namespace
    pub host_pid: bool,
    /// Service account the pod runs as
    pub service_account: String,
    /// Final env, synthetic keys included
    pub env: BTreeMap<String, String>,
    /// Validated volumes, attached after dependency patching
    pub mounts: Mounts,
    /// Effective status-check timing
    pub status_check: StatusCheck,
}

impl Default for StatusCheck {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(DEFAULT_STATUS_CHECK_DELAY),
            timeout: Duration::from_secs(DEFAULT_STATUS_CHECK_TIMEOUT),
        }
    }
}

impl ExperimentContext {
    /// Attach validated mount descriptors
    pub fn with_mounts(mut self, mounts: Mounts) -> Self {
        self.mounts = mounts;
        self
    }

    /// Env entries in key order, as passed to the container
    pub fn env_vars(&self) -> Vec<EnvVar> {
        self.env
            .iter()
            .map(|(name, value)| EnvVar {
                name: name.clone(),
                value: Some(value.clone()),
                ..Default::default()
            })
            .collect()
    }
}

/// Job name for an experiment: `{experiment}-{6 random chars}`
pub fn generate_job_name(experiment: &str) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..JOB_SUFFIX_LEN)
        .map(|_| JOB_SUFFIX_ALPHABET[rng.gen_range(0..JOB_SUFFIX_ALPHABET.len())] as char)
        .collect();
    format!("{}-{}", experiment, suffix)
}

/// Fetch the ChaosExperiment definition from the engine namespace.
///
/// A missing definition is [`RunnerError::ExperimentNotFound`]; nothing about
/// the experiment can be resolved without it.
pub async fn fetch_definition(
    client: &dyn ChaosKubeClient,
    engine: &EngineContext,
    experiment: &str,
    retry: &RetryConfig,
) -> Result<ExperimentDef, RunnerError> {
    let found = retry_with_backoff_if(
        retry,
        "get_experiment",
        RunnerError::is_transient,
        || client.get_experiment(experiment, &engine.namespace),
    )
    .await?;

    found
        .map(|e| e.spec.definition)
        .ok_or_else(|| RunnerError::ExperimentNotFound {
            name: experiment.to_string(),
            namespace: engine.namespace.clone(),
        })
}

/// Fetch and resolve one experiment, generating its job name.
///
/// The definition is returned alongside the context; the dependency patcher
/// needs its declared mounts.
pub async fn resolve_experiment(
    client: &dyn ChaosKubeClient,
    engine: &EngineContext,
    experiment: &str,
    retry: &RetryConfig,
) -> Result<(ExperimentContext, ExperimentDef), RunnerError> {
    let definition = fetch_definition(client, engine, experiment, retry).await?;
    let context = resolve(engine, experiment, &definition, generate_job_name(experiment));
    Ok((context, definition))
}

/// Merge the definition with the engine overrides for `experiment`
pub fn resolve(
    engine: &EngineContext,
    experiment: &str,
    definition: &ExperimentDef,
    job_name: String,
) -> ExperimentContext {
    let overrides = engine.overrides_for(experiment);

    let mut env = env_map(&definition.env);
    if let Some(components) = overrides {
        env.extend(env_map(&components.env));
    }
    env.extend(engine_env(engine, experiment));

    let status_check = status_check(overrides);
    env.insert(
        env_keys::STATUS_CHECK_DELAY.to_string(),
        status_check.delay.as_secs().to_string(),
    );
    env.insert(
        env_keys::STATUS_CHECK_TIMEOUT.to_string(),
        status_check.timeout.as_secs().to_string(),
    );

    let empty = ExperimentComponents::default();
    let components = overrides.unwrap_or(&empty);
    let default_security = definition.security_context.clone().unwrap_or_default();
    let override_security = components.security_context.clone().unwrap_or_default();

    let image = components
        .experiment_image
        .clone()
        .filter(|i| !i.is_empty())
        .unwrap_or_else(|| definition.image.clone());

    debug!(
        engine = %engine.name,
        experiment = %experiment,
        job = %job_name,
        image = %image,
        env_count = env.len(),
        "resolved experiment attributes"
    );

    ExperimentContext {
        name: experiment.to_string(),
        namespace: engine.namespace.clone(),
        job_name,
        image,
        image_pull_policy: definition.image_pull_policy.clone(),
        command: definition.command.clone(),
        args: definition.args.clone(),
        labels: definition.labels.clone(),
        annotations: components.experiment_annotations.clone(),
        node_selector: components.node_selector.clone(),
        tolerations: components.tolerations.clone(),
        resources: components.resources.clone(),
        image_pull_secrets: components.experiment_image_pull_secrets.clone(),
        pod_security_context: override_security
            .pod_security_context
            .or(default_security.pod_security_context),
        container_security_context: override_security
            .container_security_context
            .or(default_security.container_security_context),
        host_pid: definition.host_pid,
        service_account: engine.service_account.clone(),
        env,
        mounts: Mounts::default(),
        status_check,
    }
}

fn env_map(vars: &[EnvVar]) -> BTreeMap<String, String> {
    vars.iter()
        .map(|v| (v.name.clone(), v.value.clone().unwrap_or_default()))
        .collect()
}

fn engine_env(engine: &EngineContext, experiment: &str) -> BTreeMap<String, String> {
    [
        (env_keys::CHAOSENGINE, engine.name.clone()),
        (env_keys::APP_LABEL, engine.app.applabel.clone()),
        (env_keys::APP_NAMESPACE, engine.app.appns.clone()),
        (env_keys::CHAOS_NAMESPACE, engine.namespace.clone()),
        (env_keys::APP_KIND, engine.app.appkind.clone()),
        (env_keys::AUXILIARY_APPINFO, engine.auxiliary_app_info.clone()),
        (env_keys::CHAOS_UID, engine.uid.clone()),
        (env_keys::EXPERIMENT_NAME, experiment.to_string()),
        (env_keys::ANNOTATION_KEY, CHAOS_ANNOTATION_KEY.to_string()),
        (env_keys::ANNOTATION_CHECK, engine.annotation_check.clone()),
        (env_keys::JOB_CLEANUP_POLICY, engine.cleanup_policy.to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

/// A zero override counts as unset
fn status_check(overrides: Option<&ExperimentComponents>) -> StatusCheck {
    let timeouts = overrides.map(|c| &c.status_check_timeouts);
    let pick = |value: Option<u64>, default: u64| match value {
        Some(v) if v > 0 => v,
        _ => default,
    };
    StatusCheck {
        delay: Duration::from_secs(pick(timeouts.map(|t| t.delay), DEFAULT_STATUS_CHECK_DELAY)),
        timeout: Duration::from_secs(pick(
            timeouts.map(|t| t.timeout),
            DEFAULT_STATUS_CHECK_TIMEOUT,
        )),
    }
}
