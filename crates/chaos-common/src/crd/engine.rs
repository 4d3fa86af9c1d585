//! ChaosEngine CRD types
//!
//! A `ChaosEngine` names the experiments to run against a target application
//! and carries per-experiment overrides. Its status holds one
//! [`ExperimentStatus`] record per experiment, keyed by experiment name.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{
    EnvVar, LocalObjectReference, PodSecurityContext, ResourceRequirements, SecurityContext,
    Toleration,
};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::experiment::{ConfigMapRef, SecretRef};

// =============================================================================
// Cleanup policy
// =============================================================================

/// What happens to an experiment Job once it has finished
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CleanupPolicy {
    /// Delete the Job (foreground propagation) after completion
    Delete,
    /// Keep the Job around for inspection
    #[default]
    Retain,
}

impl CleanupPolicy {
    /// Whether the finished Job should be removed
    pub fn should_delete(self) -> bool {
        matches!(self, Self::Delete)
    }
}

impl std::str::FromStr for CleanupPolicy {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "delete" => Ok(Self::Delete),
            "retain" => Ok(Self::Retain),
            _ => Err(crate::Error::unknown_variant("job cleanup policy", s, &["delete", "retain"])),
        }
    }
}

impl std::fmt::Display for CleanupPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Delete => write!(f, "delete"),
            Self::Retain => write!(f, "retain"),
        }
    }
}

// =============================================================================
// Spec
// =============================================================================

/// Target application of the chaos run
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ApplicationParams {
    /// Namespace of the target application
    #[serde(default)]
    pub appns: String,
    /// Label selector of the target application
    #[serde(default)]
    pub applabel: String,
    /// Kind of the target application (deployment, statefulset, ...)
    #[serde(default)]
    pub appkind: String,
}

/// Status-check timing overrides, in seconds. Zero means "not set".
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct StatusCheckTimeout {
    /// Delay between status checks
    #[serde(default)]
    pub delay: u64,
    /// Overall status-check timeout
    #[serde(default)]
    pub timeout: u64,
}

/// Pod and container security contexts for the experiment pod
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecurityContextSpec {
    /// Pod-level security context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_security_context: Option<PodSecurityContext>,
    /// Container-level security context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_security_context: Option<SecurityContext>,
}

/// Engine-side overrides for one experiment
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentComponents {
    /// Env entries overriding the experiment defaults by name
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,

    /// ConfigMaps to mount; replaces the definition's list when non-empty
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub config_maps: Vec<ConfigMapRef>,

    /// Secrets to mount; replaces the definition's list when non-empty
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<SecretRef>,

    /// Image override for the experiment container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experiment_image: Option<String>,

    /// Image pull secrets for the experiment pod
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub experiment_image_pull_secrets: Vec<LocalObjectReference>,

    /// Annotations added to the experiment pod
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub experiment_annotations: BTreeMap<String, String>,

    /// Node selector for the experiment pod
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,

    /// Status-check delay/timeout overrides
    #[serde(default)]
    pub status_check_timeouts: StatusCheckTimeout,

    /// Resource requirements for the experiment container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    /// Tolerations for the experiment pod
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<Toleration>,

    /// Security context overrides
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_context: Option<SecurityContextSpec>,
}

/// Per-experiment attributes on the engine
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ExperimentAttributes {
    /// Override components
    #[serde(default)]
    pub components: ExperimentComponents,
}

/// One experiment listed on the engine
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ExperimentList {
    /// Name of the ChaosExperiment to run
    pub name: String,
    /// Engine-side overrides for this experiment
    #[serde(default)]
    pub spec: ExperimentAttributes,
}

/// Declarative description of one chaos run
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "litmuschaos.io",
    version = "v1alpha1",
    kind = "ChaosEngine",
    plural = "chaosengines",
    namespaced,
    status = "ChaosEngineStatus",
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.engineStatus"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ChaosEngineSpec {
    /// Target application
    #[serde(default)]
    pub appinfo: ApplicationParams,

    /// Service account the experiment pods run as
    #[serde(default)]
    pub chaos_service_account: String,

    /// Whether the target must carry the chaos annotation ("true"/"false")
    #[serde(default = "default_annotation_check")]
    pub annotation_check: String,

    /// Auxiliary application info passed through to experiments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auxiliary_app_info: Option<String>,

    /// Cleanup policy for finished experiment Jobs
    #[serde(default)]
    pub job_clean_up_policy: CleanupPolicy,

    /// Experiments to run, in order
    #[serde(default)]
    pub experiments: Vec<ExperimentList>,
}

fn default_annotation_check() -> String {
    "false".to_string()
}

// =============================================================================
// Status
// =============================================================================

/// Overall state of the engine
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    /// Experiments are being run
    #[default]
    Initialized,
    /// All experiments have been processed
    Completed,
    /// The run was stopped before finishing
    Stopped,
}

/// One entry of the engine's experiment status array
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentStatus {
    /// Experiment name; the lookup key into the array
    pub name: String,
    /// Runner that owns this experiment
    #[serde(default)]
    pub runner: String,
    /// Job (pod) running the experiment
    #[serde(default)]
    pub experiment_pod: String,
    /// Lifecycle status string
    pub status: String,
    /// Verdict string
    pub verdict: String,
    /// Last time this record was written
    pub last_update_time: DateTime<Utc>,
}

/// Status of a ChaosEngine
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChaosEngineStatus {
    /// Overall engine state
    #[serde(default)]
    pub engine_status: EngineState,

    /// Per-experiment status records
    #[serde(default)]
    pub experiments: Vec<ExperimentStatus>,
}

impl ChaosEngineStatus {
    /// Index of the first record with the given name
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.experiments.iter().position(|e| e.name == name)
    }
}

// =============================================================================
// Tests
// =============================================================================
